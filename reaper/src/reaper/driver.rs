//! Ties listing, the two stages and the orchestrator into one reaper run.

use super::api::DeploymentApi;
use super::listing::collect_deployments;
use super::model::RemovalRecord;
use super::stages::{FetchDetailsStage, RemoveStaleStage, REMOVED_BUCKET};
use crate::config::ReaperConfig;
use crate::core::TaskId;
use crate::errors::{ReaperError, TaskFailure};
use crate::events::{EventSink, FanoutEventSink, LoggingEventSink};
use crate::pipeline::{PipelineOrchestrator, RunSummary, StageSpec};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of one reaper run.
#[derive(Debug, Clone, Serialize)]
pub struct ReapReport {
    /// Deployments found by the listing.
    pub found: usize,
    /// Removed deployments by id.
    pub removed: BTreeMap<TaskId, RemovalRecord>,
    /// Deployments whose pipeline failed.
    pub failures: Vec<TaskFailure>,
    /// Orchestrator totals.
    pub summary: RunSummary,
}

/// Lists deployments and removes the stale ones.
///
/// Pipeline events always reach a [`LoggingEventSink`], which prints the
/// per-deployment error lines; extra sinks receive the same events after it.
pub struct Reaper {
    api: Arc<dyn DeploymentApi>,
    config: ReaperConfig,
    sinks: FanoutEventSink,
}

impl Reaper {
    /// Creates a reaper that logs pipeline events.
    #[must_use]
    pub fn new(api: Arc<dyn DeploymentApi>, config: ReaperConfig) -> Self {
        Self {
            api,
            config,
            sinks: FanoutEventSink::new().with_sink(Arc::new(LoggingEventSink::default())),
        }
    }

    /// Adds a sink receiving pipeline events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks = self.sinks.with_sink(sink);
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ReaperConfig {
        &self.config
    }

    /// Builds the two-stage orchestrator judging deployments against `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the retention window or a stage specification
    /// is invalid.
    pub fn pipeline(&self, now: DateTime<Utc>) -> Result<PipelineOrchestrator, ReaperError> {
        let details = StageSpec::new(Arc::new(FetchDetailsStage::new(self.api.clone())))
            .with_timeout_ms(self.config.details_timeout_ms)
            .with_max_attempts(self.config.details_max_attempts);
        let remove = StageSpec::new(Arc::new(RemoveStaleStage::new(
            self.api.clone(),
            self.config.policy()?,
            now,
        )))
        .with_timeout_ms(self.config.delete_timeout_ms)
        .with_max_attempts(self.config.delete_max_attempts);

        let orchestrator = PipelineOrchestrator::new(vec![details, remove])?;
        Ok(orchestrator.with_event_sink(Arc::new(self.sinks.clone())))
    }

    /// Runs the reaper once.
    ///
    /// `now` is captured once by the caller, before listing, and every
    /// deployment's age is measured against it.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or listing fails.
    /// Per-deployment failures are reported in the [`ReapReport`] instead.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<ReapReport, ReaperError> {
        self.config.validate()?;

        let deployments = collect_deployments(self.api.as_ref())
            .await
            .map_err(ReaperError::Listing)?;
        let found = deployments.len();

        let mut orchestrator = self.pipeline(now)?;
        orchestrator.add_tasks(deployments.into_iter().map(super::model::Deployment::into_task));
        let report = orchestrator.run(self.config.concurrency).await?;

        let removed: BTreeMap<TaskId, RemovalRecord> = report
            .bucket(REMOVED_BUCKET)
            .into_iter()
            .filter_map(|(id, value)| match serde_json::from_value(value) {
                Ok(record) => Some((id, record)),
                Err(e) => {
                    warn!(task_id = %id, error = %e, "Unreadable removal record");
                    None
                }
            })
            .collect();

        info!(count = removed.len(), "{} deployments removed.", removed.len());

        Ok(ReapReport {
            found,
            removed,
            failures: report.failures,
            summary: report.summary,
        })
    }
}

impl std::fmt::Debug for Reaper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reaper")
            .field("config", &self.config)
            .field("sinks", &self.sinks.len())
            .finish_non_exhaustive()
    }
}
