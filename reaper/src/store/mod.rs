//! Result store shared by the stages of one pipeline run.
//!
//! Each task's stages run one after another, so a task id is only ever
//! written by one stage at a time. Aggregates such as `removed` are keyed by
//! task id as well, which keeps concurrent writers on disjoint keys.

use crate::core::{StageOutput, TaskId};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Aggregated results for one bucket, ordered by task id.
pub type Aggregate = BTreeMap<TaskId, serde_json::Value>;

/// In-memory mapping from task id to the latest resolved result.
#[derive(Debug, Default)]
pub struct ResultStore {
    /// Per-task results.
    results: DashMap<TaskId, serde_json::Value>,
    /// Named aggregates, e.g. `removed`.
    aggregates: RwLock<HashMap<String, Aggregate>>,
}

impl ResultStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores or overwrites the value for `id`. A `None` value is a no-op.
    pub fn set(&self, id: &TaskId, value: Option<serde_json::Value>) {
        if let Some(value) = value {
            self.results.insert(id.clone(), value);
        }
    }

    /// Returns the stored value for `id`.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<serde_json::Value> {
        self.results.get(id).map(|entry| entry.value().clone())
    }

    /// Records `value` for `id` in the named aggregate.
    pub fn aggregate(&self, bucket: &str, id: &TaskId, value: serde_json::Value) {
        self.aggregates
            .write()
            .entry(bucket.to_string())
            .or_default()
            .insert(id.clone(), value);
    }

    /// Returns a snapshot of the named aggregate; empty if nothing was recorded.
    #[must_use]
    pub fn bucket(&self, bucket: &str) -> Aggregate {
        self.aggregates
            .read()
            .get(bucket)
            .cloned()
            .unwrap_or_default()
    }

    /// Applies a stage output for `id`.
    pub fn record(&self, id: &TaskId, output: StageOutput) {
        match output {
            StageOutput::Empty => {}
            StageOutput::Result { value } => self.set(id, Some(value)),
            StageOutput::Aggregate { bucket, value } => self.aggregate(&bucket, id, value),
        }
    }

    /// Returns the number of tasks with a stored result.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns true if no task has a stored result.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
