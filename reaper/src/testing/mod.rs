//! Testing utilities for the engine and the reaper.
//!
//! This module provides:
//! - Scripted stages for driving the orchestrator
//! - An in-memory deployment API

mod api;
mod mocks;

pub use api::InMemoryDeploymentApi;
pub use mocks::{FailingStage, RecordedExecution, RecordingStage, SlowStage};
