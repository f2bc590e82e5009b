//! Per-attempt stage context.

use crate::cancellation::CancellationToken;
use crate::core::TaskId;
use crate::store::ResultStore;
use std::sync::Arc;

/// What a stage attempt can see besides its task.
#[derive(Debug, Clone)]
pub struct StageContext {
    stage: String,
    attempt: usize,
    results: Arc<ResultStore>,
    cancel_token: Arc<CancellationToken>,
}

impl StageContext {
    /// Creates a context for the first attempt of a stage.
    #[must_use]
    pub fn new(stage: impl Into<String>, results: Arc<ResultStore>) -> Self {
        Self {
            stage: stage.into(),
            attempt: 1,
            results,
            cancel_token: Arc::new(CancellationToken::new()),
        }
    }

    /// Sets the 1-based attempt number.
    #[must_use]
    pub fn with_attempt(mut self, attempt: usize) -> Self {
        self.attempt = attempt;
        self
    }

    /// Sets the attempt's cancellation token.
    #[must_use]
    pub fn with_cancel_token(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancel_token = token;
        self
    }

    /// Returns the stage name.
    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Returns the 1-based attempt number.
    #[must_use]
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    /// Returns the result recorded for a task by an earlier stage.
    #[must_use]
    pub fn results(&self, id: &TaskId) -> Option<serde_json::Value> {
        self.results.get(id)
    }

    /// Returns the shared result store.
    #[must_use]
    pub fn store(&self) -> &Arc<ResultStore> {
        &self.results
    }

    /// Returns the attempt's cancellation token.
    ///
    /// The runner cancels it when the attempt times out.
    #[must_use]
    pub fn cancel_token(&self) -> &Arc<CancellationToken> {
        &self.cancel_token
    }
}
