//! Task identity and payload.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a task flowing through the pipeline.
///
/// Identity of a task is its id. Numeric identifiers are stored in their
/// decimal string form so that `42` and `"42"` name the same task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a new task id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for TaskId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

/// A unit of work: an id plus an opaque payload supplied by the caller.
///
/// The engine never mutates a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// The task identifier.
    pub id: TaskId,
    /// Caller-supplied payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Task {
    /// Creates a task with an empty payload.
    #[must_use]
    pub fn new(id: impl Into<TaskId>) -> Self {
        Self {
            id: id.into(),
            payload: serde_json::Value::Null,
        }
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_and_string_ids_match() {
        assert_eq!(TaskId::from(42_u64), TaskId::from("42"));
    }

    #[test]
    fn test_task_serializes_id_transparently() {
        let task = Task::new("dpl_1").with_payload(serde_json::json!({"url": "a.now.sh"}));
        let json = serde_json::to_value(&task).unwrap();

        assert_eq!(json["id"], "dpl_1");
        assert_eq!(json["payload"]["url"], "a.now.sh");
    }
}
