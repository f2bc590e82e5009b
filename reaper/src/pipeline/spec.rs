//! Stage specifications.

use super::RetryPolicy;
use crate::errors::ReaperError;
use crate::stages::Stage;
use std::sync::Arc;
use std::time::Duration;

/// Default per-attempt timeout.
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Specification for a single stage: the work plus its timeout and retry budget.
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// The stage name, used in logs and failures.
    pub name: String,
    /// The stage implementation.
    pub runner: Arc<dyn Stage>,
    /// Timeout for each attempt.
    pub timeout: Duration,
    /// Retry budget for the stage.
    pub retry: RetryPolicy,
}

impl StageSpec {
    /// Creates a new stage specification named after its runner.
    #[must_use]
    pub fn new(runner: Arc<dyn Stage>) -> Self {
        Self {
            name: runner.name().to_string(),
            runner,
            timeout: DEFAULT_STAGE_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the per-attempt timeout in milliseconds.
    #[must_use]
    pub fn with_timeout_ms(self, timeout_ms: u64) -> Self {
        self.with_timeout(Duration::from_millis(timeout_ms))
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.retry.max_attempts = attempts;
        self
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the timeout in whole milliseconds.
    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    /// Validates the stage specification.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage allows no attempts or has a zero timeout.
    pub fn validate(&self) -> Result<(), ReaperError> {
        if self.retry.max_attempts == 0 {
            return Err(ReaperError::Pipeline(format!(
                "Stage '{}' must allow at least one attempt",
                self.name
            )));
        }
        if self.timeout.is_zero() {
            return Err(ReaperError::Pipeline(format!(
                "Stage '{}' must have a non-zero timeout",
                self.name
            )));
        }
        Ok(())
    }
}
