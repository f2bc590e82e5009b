//! The deployment reaper built on the pipeline engine.
//!
//! This module provides:
//! - Deployment models and the [`DeploymentApi`] port
//! - The [`ReaperPolicy`] that decides staleness
//! - The details and remove stages
//! - The [`Reaper`] driver for one run

mod api;
mod driver;
#[cfg(feature = "http")]
mod http;
mod listing;
mod model;
pub(crate) mod policy;
mod stages;

#[cfg(test)]
pub(crate) use api::MockDeploymentApi;
pub use api::{DeploymentApi, ListingStream};
pub use driver::{ReapReport, Reaper};
#[cfg(feature = "http")]
pub use http::NowClient;
pub use listing::collect_deployments;
pub use model::{Deployment, DeploymentDetails, RemovalRecord, StateTimestamp};
pub use policy::{ReaperPolicy, DEFAULT_RETENTION_DAYS, DEFAULT_STALE_STATES};
pub use stages::{FetchDetailsStage, RemoveStaleStage, REMOVED_BUCKET};
