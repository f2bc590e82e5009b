//! Scripted stages for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

use crate::core::{StageOutput, Task, TaskId};
use crate::errors::StageError;
use crate::stages::{Stage, StageContext};

/// A stage that rejects, either always or for the first attempts of each task.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    error: String,
    failures: Option<usize>,
    calls: Mutex<HashMap<TaskId, usize>>,
}

impl FailingStage {
    /// Creates a stage that rejects every attempt.
    #[must_use]
    pub fn new(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error: error.into(),
            failures: None,
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a stage that rejects the first `failures` attempts of each
    /// task and then resolves empty.
    #[must_use]
    pub fn times(name: impl Into<String>, error: impl Into<String>, failures: usize) -> Self {
        Self {
            failures: Some(failures),
            ..Self::new(name, error)
        }
    }

    /// Returns the number of attempts made for a task.
    #[must_use]
    pub fn call_count(&self, id: &TaskId) -> usize {
        self.calls.lock().get(id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, task: &Task, _ctx: &StageContext) -> Result<StageOutput, StageError> {
        let calls = {
            let mut calls = self.calls.lock();
            let count = calls.entry(task.id.clone()).or_insert(0);
            *count += 1;
            *count
        };

        match self.failures {
            Some(failures) if calls > failures => Ok(StageOutput::Empty),
            _ => Err(StageError::rejected(&self.error)),
        }
    }
}

/// A stage that sleeps before resolving.
///
/// It watches its cancellation token and counts attempts that were
/// cancelled while sleeping.
#[derive(Debug)]
pub struct SlowStage {
    name: String,
    delay: Duration,
    cancelled: Mutex<usize>,
}

impl SlowStage {
    /// Creates a new slow stage.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
            cancelled: Mutex::new(0),
        }
    }

    /// Creates a slow stage with delay in milliseconds.
    #[must_use]
    pub fn with_delay_ms(name: impl Into<String>, ms: u64) -> Self {
        Self::new(name, Duration::from_millis(ms))
    }

    /// Returns how many attempts observed cancellation before finishing.
    #[must_use]
    pub fn cancelled_count(&self) -> usize {
        *self.cancelled.lock()
    }
}

#[async_trait]
impl Stage for SlowStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _task: &Task, ctx: &StageContext) -> Result<StageOutput, StageError> {
        tokio::select! {
            () = tokio::time::sleep(self.delay) => Ok(StageOutput::Empty),
            () = ctx.cancel_token().cancelled() => {
                *self.cancelled.lock() += 1;
                Err(StageError::rejected("cancelled"))
            }
        }
    }
}

/// A stage that records every attempt and resolves with the task payload.
#[derive(Debug)]
pub struct RecordingStage {
    name: String,
    executions: Mutex<Vec<RecordedExecution>>,
}

/// A recorded execution.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedExecution {
    /// The task the attempt ran for.
    pub task_id: TaskId,
    /// Stage name from context.
    pub stage_name: String,
    /// Attempt number from context.
    pub attempt: usize,
    /// The result recorded for the task when the attempt started.
    pub prior_result: Option<serde_json::Value>,
}

impl RecordingStage {
    /// Creates a new recording stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            executions: Mutex::new(Vec::new()),
        }
    }

    /// Returns all recorded executions.
    #[must_use]
    pub fn executions(&self) -> Vec<RecordedExecution> {
        self.executions.lock().clone()
    }

    /// Returns the number of executions.
    #[must_use]
    pub fn execution_count(&self) -> usize {
        self.executions.lock().len()
    }
}

#[async_trait]
impl Stage for RecordingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, task: &Task, ctx: &StageContext) -> Result<StageOutput, StageError> {
        self.executions.lock().push(RecordedExecution {
            task_id: task.id.clone(),
            stage_name: ctx.stage().to_string(),
            attempt: ctx.attempt(),
            prior_result: ctx.results(&task.id),
        });
        Ok(StageOutput::result(task.payload.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::store::ResultStore;
    use std::sync::Arc;

    fn test_context(name: &str) -> StageContext {
        StageContext::new(name, Arc::new(ResultStore::new()))
    }

    #[tokio::test]
    async fn test_failing_stage() {
        let stage = FailingStage::new("fail", "test error");
        let task = Task::new("a");

        let err = stage.execute(&task, &test_context("fail")).await.unwrap_err();
        assert_eq!(err, StageError::rejected("test error"));
        assert_eq!(stage.call_count(&task.id), 1);
    }

    #[tokio::test]
    async fn test_failing_stage_recovers() {
        let stage = FailingStage::times("flaky", "not yet", 2);
        let task = Task::new("a");
        let ctx = test_context("flaky");

        assert!(stage.execute(&task, &ctx).await.is_err());
        assert!(stage.execute(&task, &ctx).await.is_err());
        assert!(stage.execute(&task, &ctx).await.is_ok());
        assert!(stage.execute(&Task::new("b"), &ctx).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_stage() {
        let stage = SlowStage::with_delay_ms("slow", 10);

        let start = tokio::time::Instant::now();
        let output = stage.execute(&Task::new("a"), &test_context("slow")).await;

        assert_eq!(output, Ok(StageOutput::Empty));
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_stage_observes_cancel() {
        let stage = SlowStage::with_delay_ms("slow", 1_000);
        let token = Arc::new(CancellationToken::new());
        let ctx = test_context("slow").with_cancel_token(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            token.cancel("timeout");
        });

        assert!(stage.execute(&Task::new("a"), &ctx).await.is_err());
        assert_eq!(stage.cancelled_count(), 1);
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_recording_stage() {
        let stage = RecordingStage::new("record");
        let store = Arc::new(ResultStore::new());
        let task = Task::new("a").with_payload(serde_json::json!({"n": 1}));
        store.set(&task.id, Some(serde_json::json!("earlier")));
        let ctx = StageContext::new("record", store).with_attempt(2);

        let output = stage.execute(&task, &ctx).await.unwrap();

        assert_eq!(output, StageOutput::result(serde_json::json!({"n": 1})));
        let executions = stage.executions();
        assert_eq!(executions[0].stage_name, "record");
        assert_eq!(executions[0].attempt, 2);
        assert_eq!(executions[0].prior_result, Some(serde_json::json!("earlier")));
    }
}
