//! Deployment records as the remote API reports them.

use crate::core::{Task, TaskId};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One entry from the deployment listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    /// Stringified deployment uid.
    pub id: TaskId,
    /// The deployment URL.
    pub url: String,
    /// Every other field the listing returned.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Deployment {
    /// Builds a deployment from a raw listing record.
    ///
    /// Returns `None` for records that are not objects, have no `url`, or
    /// have no usable `uid`.
    #[must_use]
    pub fn from_record(record: Value) -> Option<Self> {
        let Value::Object(mut fields) = record else {
            return None;
        };

        let url = match fields.remove("url") {
            Some(Value::String(url)) if !url.is_empty() => url,
            _ => return None,
        };
        let id = match fields.remove("uid") {
            Some(Value::String(uid)) if !uid.is_empty() => TaskId::from(uid),
            Some(Value::Number(uid)) => TaskId::from(uid.to_string()),
            _ => return None,
        };

        Some(Self {
            id,
            url,
            extra: fields,
        })
    }

    /// Converts the deployment into a pipeline task carrying the record as payload.
    #[must_use]
    pub fn into_task(self) -> Task {
        let id = self.id.clone();
        let payload = serde_json::to_value(&self).unwrap_or(Value::Null);
        Task::new(id).with_payload(payload)
    }
}

/// The time a deployment entered its current state.
///
/// The API reports either epoch milliseconds or an RFC 3339 string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateTimestamp {
    /// Milliseconds since the Unix epoch.
    Millis(i64),
    /// An RFC 3339 timestamp.
    Text(String),
}

impl StateTimestamp {
    /// Creates a timestamp from a point in time, in epoch milliseconds.
    #[must_use]
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self::Millis(at.timestamp_millis())
    }

    /// Parses the timestamp; `None` if it is not a valid point in time.
    #[must_use]
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Millis(ms) => Utc.timestamp_millis_opt(*ms).single(),
            Self::Text(text) => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|at| at.with_timezone(&Utc)),
        }
    }
}

impl std::fmt::Display for StateTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Millis(ms) => write!(f, "{ms}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// Per-deployment status details.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentDetails {
    /// Public hostname of the deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Current state, e.g. `READY` or `FROZEN`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// When the deployment entered `state`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_ts: Option<StateTimestamp>,
    /// Every other field the API returned.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DeploymentDetails {
    /// Creates details with a state and state timestamp.
    #[must_use]
    pub fn new(state: impl Into<String>, state_ts: StateTimestamp) -> Self {
        Self {
            state: Some(state.into()),
            state_ts: Some(state_ts),
            ..Self::default()
        }
    }

    /// Sets the host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }
}

/// What is remembered about a deployment that was removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovalRecord {
    /// Hostname, if the API reported one.
    pub host: Option<String>,
    /// State at removal time.
    pub state: String,
    /// The state timestamp, as reported.
    pub state_ts: StateTimestamp,
}
