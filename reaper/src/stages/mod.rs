//! Stage trait and implementations.
//!
//! Stages are the units of work every task passes through in order. A stage
//! knows nothing about timeouts or retries; the runner enforces those.

mod callback;
mod context;

pub use callback::{CallbackStage, Settler};
pub use context::StageContext;

use crate::core::{StageOutput, Task};
use crate::errors::StageError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;

/// Trait for pipeline stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Executes one attempt of the stage for a task.
    ///
    /// # Arguments
    ///
    /// * `task` - The task being processed
    /// * `ctx` - Results of earlier stages and the attempt's cancellation token
    ///
    /// # Returns
    ///
    /// What to record for the task, or the attempt's error.
    async fn execute(&self, task: &Task, ctx: &StageContext) -> Result<StageOutput, StageError>;
}

/// An async function-based stage.
pub struct AsyncFnStage<F, Fut>
where
    F: Fn(Task, StageContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StageOutput, StageError>> + Send,
{
    name: String,
    func: F,
}

impl<F, Fut> AsyncFnStage<F, Fut>
where
    F: Fn(Task, StageContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StageOutput, StageError>> + Send,
{
    /// Creates a new async function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F, Fut> Debug for AsyncFnStage<F, Fut>
where
    F: Fn(Task, StageContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StageOutput, StageError>> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncFnStage")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<F, Fut> Stage for AsyncFnStage<F, Fut>
where
    F: Fn(Task, StageContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StageOutput, StageError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, task: &Task, ctx: &StageContext) -> Result<StageOutput, StageError> {
        (self.func)(task.clone(), ctx.clone()).await
    }
}

/// A stage that resolves immediately with nothing to record.
#[derive(Debug, Clone)]
pub struct NoOpStage {
    name: String,
}

impl NoOpStage {
    /// Creates a new no-op stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for NoOpStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _task: &Task, _ctx: &StageContext) -> Result<StageOutput, StageError> {
        Ok(StageOutput::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ResultStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_async_fn_stage() {
        let stage = AsyncFnStage::new("echo", |task: Task, _ctx| async move {
            Ok(StageOutput::result(serde_json::json!(task.id)))
        });
        assert_eq!(stage.name(), "echo");

        let ctx = StageContext::new("echo", Arc::new(ResultStore::new()));
        let output = stage.execute(&Task::new("a"), &ctx).await.unwrap();
        assert_eq!(output, StageOutput::result(serde_json::json!("a")));
    }

    #[tokio::test]
    async fn test_noop_stage() {
        let stage = NoOpStage::new("noop");
        let ctx = StageContext::new("noop", Arc::new(ResultStore::new()));

        let output = stage.execute(&Task::new("a"), &ctx).await.unwrap();
        assert!(output.is_empty());
    }
}
