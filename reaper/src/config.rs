//! Reaper configuration.
//!
//! Values come from serde defaults, then the environment, then CLI flags.

use crate::errors::ReaperError;
use crate::reaper::policy::{ReaperPolicy, DEFAULT_RETENTION_DAYS, DEFAULT_STALE_STATES};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable holding the API access token.
pub const TOKEN_ENV: &str = "NOW_TOKEN";
/// Environment variable overriding the API base URL.
pub const API_URL_ENV: &str = "REAPER_API_URL";
/// Environment variable overriding the concurrency bound.
pub const CONCURRENCY_ENV: &str = "REAPER_CONCURRENCY";
/// Environment variable overriding the retention window in days.
pub const RETENTION_DAYS_ENV: &str = "REAPER_RETENTION_DAYS";

/// Configuration for one reaper run.
#[derive(Clone, Serialize, Deserialize)]
pub struct ReaperConfig {
    /// API access token.
    #[serde(default, skip_serializing)]
    pub token: String,
    /// Base URL of the deployment API.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Maximum deployments processed at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Days a deployment may sit in a stale state before removal.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    /// States that count as terminally failed.
    #[serde(default = "default_stale_states")]
    pub stale_states: Vec<String>,
    /// Per-attempt timeout of the details stage.
    #[serde(default = "default_details_timeout_ms")]
    pub details_timeout_ms: u64,
    /// Attempt budget of the details stage.
    #[serde(default = "default_max_attempts")]
    pub details_max_attempts: usize,
    /// Per-attempt timeout of the remove stage.
    #[serde(default = "default_delete_timeout_ms")]
    pub delete_timeout_ms: u64,
    /// Attempt budget of the remove stage.
    #[serde(default = "default_max_attempts")]
    pub delete_max_attempts: usize,
    /// Client-level HTTP timeout, a backstop for the listing request.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_api_base_url() -> String {
    "https://api.zeit.co/v2/now/".to_string()
}

fn default_concurrency() -> usize {
    10
}

fn default_retention_days() -> i64 {
    DEFAULT_RETENTION_DAYS
}

fn default_stale_states() -> Vec<String> {
    DEFAULT_STALE_STATES.iter().map(ToString::to_string).collect()
}

fn default_details_timeout_ms() -> u64 {
    3_000
}

fn default_delete_timeout_ms() -> u64 {
    5_000
}

fn default_max_attempts() -> usize {
    5
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base_url: default_api_base_url(),
            concurrency: default_concurrency(),
            retention_days: default_retention_days(),
            stale_states: default_stale_states(),
            details_timeout_ms: default_details_timeout_ms(),
            details_max_attempts: default_max_attempts(),
            delete_timeout_ms: default_delete_timeout_ms(),
            delete_max_attempts: default_max_attempts(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl ReaperConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if an override cannot be parsed.
    pub fn from_env() -> Result<Self, ReaperError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if an override cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ReaperError> {
        let mut config = Self::default();

        if let Some(token) = lookup(TOKEN_ENV) {
            config.token = token;
        }
        if let Some(url) = lookup(API_URL_ENV) {
            config.api_base_url = url;
        }
        if let Some(raw) = lookup(CONCURRENCY_ENV) {
            config.concurrency = parse_var(CONCURRENCY_ENV, &raw)?;
        }
        if let Some(raw) = lookup(RETENTION_DAYS_ENV) {
            config.retention_days = parse_var(RETENTION_DAYS_ENV, &raw)?;
        }

        Ok(config)
    }

    /// Sets the token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Sets the API base URL.
    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Sets the concurrency bound.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the retention window in days.
    #[must_use]
    pub fn with_retention_days(mut self, days: i64) -> Self {
        self.retention_days = days;
        self
    }

    /// Sets the details stage timeout and attempt budget.
    #[must_use]
    pub fn with_details_stage(mut self, timeout_ms: u64, max_attempts: usize) -> Self {
        self.details_timeout_ms = timeout_ms;
        self.details_max_attempts = max_attempts;
        self
    }

    /// Sets the remove stage timeout and attempt budget.
    #[must_use]
    pub fn with_delete_stage(mut self, timeout_ms: u64, max_attempts: usize) -> Self {
        self.delete_timeout_ms = timeout_ms;
        self.delete_max_attempts = max_attempts;
        self
    }

    /// Gets the client request timeout as a Duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Returns the retention window, if it fits in a `chrono::Duration`.
    #[must_use]
    pub fn retention(&self) -> Option<chrono::Duration> {
        chrono::Duration::try_days(self.retention_days)
    }

    /// Builds the reaper policy these settings describe.
    ///
    /// # Errors
    ///
    /// Returns an error if the retention window is out of range.
    pub fn policy(&self) -> Result<ReaperPolicy, ReaperError> {
        let retention = self.retention().ok_or_else(|| {
            ReaperError::config(format!("retention_days {} is out of range", self.retention_days))
        })?;
        Ok(ReaperPolicy::new()
            .with_retention(retention)
            .with_stale_states(self.stale_states.iter().cloned()))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for zero concurrency, attempts or timeouts, or a
    /// negative or out-of-range retention window.
    pub fn validate(&self) -> Result<(), ReaperError> {
        if self.concurrency == 0 {
            return Err(ReaperError::config("concurrency must be at least 1"));
        }
        if self.retention_days < 0 {
            return Err(ReaperError::config("retention_days must not be negative"));
        }
        if self.retention().is_none() {
            return Err(ReaperError::config(format!(
                "retention_days {} is out of range",
                self.retention_days
            )));
        }
        if self.details_max_attempts == 0 || self.delete_max_attempts == 0 {
            return Err(ReaperError::config("stages must allow at least one attempt"));
        }
        if self.details_timeout_ms == 0 || self.delete_timeout_ms == 0 {
            return Err(ReaperError::config("stage timeouts must be non-zero"));
        }
        Ok(())
    }

    /// Validates the configuration and requires an access token.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails or the token is empty.
    pub fn validate_with_token(&self) -> Result<(), ReaperError> {
        self.validate()?;
        if self.token.trim().is_empty() {
            return Err(ReaperError::config(format!("{TOKEN_ENV} is not set")));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ReaperConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaperConfig")
            .field("token", &if self.token.is_empty() { "<unset>" } else { "<redacted>" })
            .field("api_base_url", &self.api_base_url)
            .field("concurrency", &self.concurrency)
            .field("retention_days", &self.retention_days)
            .field("stale_states", &self.stale_states)
            .field("details_timeout_ms", &self.details_timeout_ms)
            .field("details_max_attempts", &self.details_max_attempts)
            .field("delete_timeout_ms", &self.delete_timeout_ms)
            .field("delete_max_attempts", &self.delete_max_attempts)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ReaperError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ReaperError::config(format!("invalid {key}={raw:?}: {e}")))
}
