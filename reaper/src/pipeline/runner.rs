//! Executes one stage for one task under its timeout and retry budget.

use super::{PipelineState, StageSpec};
use crate::cancellation::CancellationToken;
use crate::core::Task;
use crate::errors::{StageError, TaskFailure};
use crate::events::{EventSink, PipelineEvent};
use crate::stages::StageContext;
use crate::store::ResultStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Runs stage attempts and records their outputs.
#[derive(Clone)]
pub struct StageRunner {
    store: Arc<ResultStore>,
    sink: Arc<dyn EventSink>,
}

impl StageRunner {
    /// Creates a runner writing into `store` and reporting attempt failures to `sink`.
    #[must_use]
    pub fn new(store: Arc<ResultStore>, sink: Arc<dyn EventSink>) -> Self {
        Self { store, sink }
    }

    /// Runs `spec` for `task` until an attempt succeeds or the budget is spent.
    ///
    /// Each attempt races the stage work against the stage timeout. Whichever
    /// settles first decides the attempt; the loser is dropped, so a late
    /// resolve can never reach the store. On timeout the attempt's token is
    /// cancelled, which runs the cancel callbacks the work registered.
    ///
    /// # Errors
    ///
    /// Returns the task failure once `spec.retry.max_attempts` attempts failed.
    pub async fn run(
        &self,
        task: &Task,
        spec: &StageSpec,
        state: &mut PipelineState,
    ) -> Result<(), TaskFailure> {
        loop {
            let token = Arc::new(CancellationToken::new());
            let attempt = state.begin_attempt(token.clone());
            let ctx = StageContext::new(spec.name.clone(), self.store.clone())
                .with_attempt(attempt)
                .with_cancel_token(token);

            debug!(task_id = %task.id, stage = %spec.name, attempt, "Starting stage attempt");

            let outcome = match tokio::time::timeout(spec.timeout, spec.runner.execute(task, &ctx)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    let error = StageError::timeout(&spec.name, spec.timeout_ms());
                    if let Some(cancel) = state.cancel_handle() {
                        cancel.cancel(error.to_string());
                    }
                    Err(error)
                }
            };
            state.settle_attempt();

            let error = match outcome {
                Ok(output) => {
                    self.store.record(&task.id, output);
                    return Ok(());
                }
                Err(error) => error,
            };

            self.sink
                .emit(PipelineEvent::AttemptFailed {
                    task_id: task.id.clone(),
                    stage: spec.name.clone(),
                    attempt,
                    max_attempts: spec.retry.max_attempts,
                    error: error.clone(),
                })
                .await;

            if !spec.retry.allows_retry(attempt) {
                return Err(TaskFailure::new(task.id.clone(), &spec.name, attempt, error));
            }

            let delay = spec.retry.delay_after(attempt);
            warn!(
                task_id = %task.id,
                stage = %spec.name,
                attempt,
                remaining = state.attempts_remaining(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Retrying stage after error"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

impl std::fmt::Debug for StageRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRunner")
            .field("results", &self.store.len())
            .finish()
    }
}
