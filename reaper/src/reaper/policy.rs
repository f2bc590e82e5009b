//! The rule that decides whether a deployment is stale enough to delete.
//!
//! The decision is a pure function of the details and a `now` snapshot the
//! caller captures once per run.

use super::model::{DeploymentDetails, RemovalRecord};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;

/// Default retention window, in days.
pub const DEFAULT_RETENTION_DAYS: i64 = 100;

/// States that count as terminally failed by default.
pub const DEFAULT_STALE_STATES: [&str; 2] = ["DEPLOYMENT_ERROR", "FROZEN"];

/// Reaper policy: which states are stale and for how long they are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaperPolicy {
    retention: Duration,
    stale_states: BTreeSet<String>,
}

impl Default for ReaperPolicy {
    fn default() -> Self {
        Self {
            retention: Duration::days(DEFAULT_RETENTION_DAYS),
            stale_states: DEFAULT_STALE_STATES.iter().map(ToString::to_string).collect(),
        }
    }
}

impl ReaperPolicy {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retention window.
    #[must_use]
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Replaces the set of stale states.
    #[must_use]
    pub fn with_stale_states(mut self, states: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.stale_states = states.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the retention window.
    #[must_use]
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Returns true if `state` is one of the stale states.
    #[must_use]
    pub fn is_stale_state(&self, state: &str) -> bool {
        self.stale_states.contains(state)
    }

    /// Returns true if the deployment should be deleted.
    ///
    /// Eligible iff the state is stale and `now - stateTs >= retention`.
    /// Missing or unparseable state data is never eligible.
    #[must_use]
    pub fn is_eligible(&self, details: &DeploymentDetails, now: DateTime<Utc>) -> bool {
        let Some(state) = details.state.as_deref() else {
            return false;
        };
        let Some(state_at) = details.state_ts.as_ref().and_then(|ts| ts.to_datetime()) else {
            return false;
        };

        self.is_stale_state(state) && now.signed_duration_since(state_at) >= self.retention
    }

    /// Returns the removal record for an eligible deployment.
    #[must_use]
    pub fn removal(&self, details: &DeploymentDetails, now: DateTime<Utc>) -> Option<RemovalRecord> {
        if !self.is_eligible(details, now) {
            return None;
        }

        Some(RemovalRecord {
            host: details.host.clone(),
            state: details.state.clone()?,
            state_ts: details.state_ts.clone()?,
        })
    }
}
