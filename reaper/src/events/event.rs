//! Events emitted by a pipeline run.

use crate::core::TaskId;
use crate::errors::{StageError, TaskFailure};
use crate::pipeline::RunSummary;
use serde::Serialize;

/// A notification produced by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// One attempt of a stage failed; the stage may still be retried.
    AttemptFailed {
        /// The task being processed.
        task_id: TaskId,
        /// The stage name.
        stage: String,
        /// 1-based attempt number that failed.
        attempt: usize,
        /// The stage's attempt budget.
        max_attempts: usize,
        /// The attempt's error.
        #[serde(serialize_with = "serialize_display")]
        error: StageError,
    },
    /// A task exhausted a stage's attempts; its pipeline has ended.
    TaskFailed(TaskFailure),
    /// Every task has reached a terminal state.
    Completed(RunSummary),
}

impl PipelineEvent {
    /// Returns the dotted event type name.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::AttemptFailed { .. } => "stage.attempt_failed",
            Self::TaskFailed(_) => "task.failed",
            Self::Completed(_) => "run.completed",
        }
    }

    /// Returns the task the event refers to, if any.
    #[must_use]
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Self::AttemptFailed { task_id, .. } => Some(task_id),
            Self::TaskFailed(failure) => Some(&failure.task_id),
            Self::Completed(_) => None,
        }
    }

    /// Returns true for the terminal completion event.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

fn serialize_display<S: serde::Serializer>(
    error: &StageError,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}
