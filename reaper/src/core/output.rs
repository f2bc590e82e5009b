//! Values a stage resolves with.

use serde::{Deserialize, Serialize};

/// What a successful stage attempt hands back to the engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageOutput {
    /// Nothing to record, proceed to the next stage.
    #[default]
    Empty,
    /// Replace the task's own result with this value.
    Result {
        /// The value recorded under the task id.
        value: serde_json::Value,
    },
    /// Record this value in a named aggregate, keyed by the task id.
    Aggregate {
        /// The aggregate bucket, e.g. `"removed"`.
        bucket: String,
        /// The value recorded for the task in that bucket.
        value: serde_json::Value,
    },
}

impl StageOutput {
    /// Creates an output recorded under the task id.
    #[must_use]
    pub fn result(value: serde_json::Value) -> Self {
        Self::Result { value }
    }

    /// Creates an output recorded in a named aggregate.
    #[must_use]
    pub fn aggregate(bucket: impl Into<String>, value: serde_json::Value) -> Self {
        Self::Aggregate {
            bucket: bucket.into(),
            value,
        }
    }

    /// Returns true if nothing will be recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}
