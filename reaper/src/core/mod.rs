//! Core types shared by the pipeline engine.
//!
//! This module provides:
//! - Task identity and payload
//! - Stage outputs recorded into the result store

mod output;
mod task;

pub use output::StageOutput;
pub use task::{Task, TaskId};
