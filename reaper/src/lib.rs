//! # Deploy Reaper
//!
//! Removes deployments that have sat in a failed state for too long, built
//! on a small bounded-concurrency task engine.
//!
//! The engine provides:
//!
//! - **Stage-based execution**: every task passes through the same ordered stages
//! - **Per-attempt timeouts and retries**: a stuck attempt is cancelled and retried
//! - **Bounded concurrency**: at most N tasks are in flight at once
//! - **Event-driven observability**: per-task failures and one completion event
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use deploy_reaper::prelude::*;
//!
//! let api = Arc::new(NowClient::new(&config)?);
//! let report = Reaper::new(api, config).run(Utc::now()).await?;
//! println!("{} deployments removed.", report.removed.len());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod reaper;
pub mod stages;
pub mod store;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::ReaperConfig;
    pub use crate::core::{StageOutput, Task, TaskId};
    pub use crate::errors::{ApiError, ReaperError, StageError, TaskFailure};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent};
    pub use crate::pipeline::{
        PipelineOrchestrator, RetryPolicy, RunReport, RunSummary, StageSpec,
    };
    #[cfg(feature = "http")]
    pub use crate::reaper::NowClient;
    pub use crate::reaper::{DeploymentApi, ReapReport, Reaper, ReaperPolicy};
    pub use crate::stages::{CallbackStage, Settler, Stage, StageContext};
    pub use crate::store::ResultStore;
}
