//! Error types for the reaper.
//!
//! Errors are split by blast radius: [`StageError`] is isolated to one
//! attempt of one task, [`TaskFailure`] is what gets reported once a task's
//! attempts are exhausted, and [`ReaperError`] is fatal to a whole run.

use crate::core::TaskId;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for reaper operations.
#[derive(Debug, Error)]
pub enum ReaperError {
    /// Configuration was missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Listing deployments failed; the run cannot proceed.
    #[error("Listing deployments failed: {0}")]
    Listing(#[source] ApiError),

    /// The pipeline could not be constructed or run.
    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

impl ReaperError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Errors returned by the remote deployment API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// The request never produced a response.
    #[error("Transport error on {path}: {message}")]
    Transport {
        /// The API path requested.
        path: String,
        /// The underlying error message.
        message: String,
    },

    /// The API answered with a non-success status.
    #[error("HTTP {status} on {path}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The API path requested.
        path: String,
    },

    /// The response body could not be decoded.
    #[error("Decode error on {path}: {message}")]
    Decode {
        /// The API path requested.
        path: String,
        /// The underlying error message.
        message: String,
    },
}

impl ApiError {
    /// Creates a transport error.
    #[must_use]
    pub fn transport(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a status error.
    #[must_use]
    pub fn status(status: u16, path: impl Into<String>) -> Self {
        Self::Status {
            status,
            path: path.into(),
        }
    }

    /// Creates a decode error.
    #[must_use]
    pub fn decode(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns the API path the error occurred on.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Transport { path, .. } | Self::Status { path, .. } | Self::Decode { path, .. } => {
                path
            }
        }
    }
}

/// Failure of a single stage attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StageError {
    /// The stage work rejected the attempt.
    #[error("{0}")]
    Rejected(String),

    /// A remote call made by the stage failed.
    #[error("{0}")]
    Api(#[from] ApiError),

    /// The attempt did not settle within the stage timeout.
    #[error("Stage '{stage}' timed out after {timeout_ms}ms")]
    Timeout {
        /// The stage name.
        stage: String,
        /// The configured timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The stage work was dropped without settling.
    #[error("Stage '{stage}' dropped its settle handle without resolving")]
    Abandoned {
        /// The stage name.
        stage: String,
    },

    /// The task's pipeline panicked.
    #[error("Pipeline panicked: {0}")]
    Panicked(String),
}

impl StageError {
    /// Creates a rejection error.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(stage: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            stage: stage.into(),
            timeout_ms,
        }
    }

    /// Returns true if the attempt timed out.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns a short kind label for logs and events.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rejected(_) => "rejected",
            Self::Api(_) => "api",
            Self::Timeout { .. } => "timeout",
            Self::Abandoned { .. } => "abandoned",
            Self::Panicked(_) => "panicked",
        }
    }
}

/// A task whose pipeline ended without completing every stage.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Task '{task_id}' failed at stage '{stage}' after {attempts} attempt(s): {error}")]
pub struct TaskFailure {
    /// The failed task.
    pub task_id: TaskId,
    /// The stage the task was in when it gave up.
    pub stage: String,
    /// Attempts made at that stage.
    pub attempts: usize,
    /// The error from the last attempt.
    #[source]
    pub error: StageError,
}

impl TaskFailure {
    /// Creates a new task failure.
    #[must_use]
    pub fn new(task_id: TaskId, stage: impl Into<String>, attempts: usize, error: StageError) -> Self {
        Self {
            task_id,
            stage: stage.into(),
            attempts,
            error,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("task_id".to_string(), serde_json::json!(self.task_id));
        map.insert("stage".to_string(), serde_json::json!(self.stage));
        map.insert("attempts".to_string(), serde_json::json!(self.attempts));
        map.insert("kind".to_string(), serde_json::json!(self.error.kind()));
        map.insert("error".to_string(), serde_json::json!(self.error.to_string()));
        map
    }
}

impl Serialize for TaskFailure {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_dict().serialize(serializer)
    }
}
