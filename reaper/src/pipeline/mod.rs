//! Pipeline building and execution.
//!
//! This module provides:
//! - Stage specifications with per-stage timeout and retry budget
//! - The stage runner that enforces them for one task
//! - The orchestrator that bounds concurrency across all tasks

mod orchestrator;
mod report;
mod retry;
mod runner;
mod spec;
mod state;

pub use orchestrator::PipelineOrchestrator;
pub use report::{RunReport, RunSummary};
pub use retry::{BackoffStrategy, JitterStrategy, RetryPolicy};
pub use runner::StageRunner;
pub use spec::{StageSpec, DEFAULT_STAGE_TIMEOUT};
pub use state::PipelineState;
