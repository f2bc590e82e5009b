//! What a finished run hands back.

use crate::core::TaskId;
use crate::errors::TaskFailure;
use crate::store::{Aggregate, ResultStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Totals for one orchestrator run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Identifier of the run.
    pub run_id: String,
    /// Tasks submitted.
    pub total: usize,
    /// Tasks that completed every stage.
    pub succeeded: usize,
    /// Tasks whose pipeline ended in a failure.
    pub failed: usize,
    /// Concurrency bound the run used.
    pub concurrency: usize,
    /// Most tasks in flight at once.
    pub peak_in_flight: usize,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
}

impl RunSummary {
    /// Returns the fraction of tasks that succeeded.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.succeeded as f64 / self.total as f64
    }
}

/// The outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Run totals.
    pub summary: RunSummary,
    /// One entry per failed task, in the order they failed.
    pub failures: Vec<TaskFailure>,
    store: Arc<ResultStore>,
}

impl RunReport {
    pub(crate) fn new(summary: RunSummary, failures: Vec<TaskFailure>, store: Arc<ResultStore>) -> Self {
        Self {
            summary,
            failures,
            store,
        }
    }

    /// Returns the final result recorded for a task.
    #[must_use]
    pub fn results(&self, id: &TaskId) -> Option<serde_json::Value> {
        self.store.get(id)
    }

    /// Returns the named aggregate, e.g. `removed`.
    #[must_use]
    pub fn bucket(&self, bucket: &str) -> Aggregate {
        self.store.bucket(bucket)
    }

    /// Returns the underlying result store.
    #[must_use]
    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }
}
