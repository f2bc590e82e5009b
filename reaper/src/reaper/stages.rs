//! The two reaper stages: fetch details, then remove if stale.

use super::api::DeploymentApi;
use super::model::{DeploymentDetails, RemovalRecord};
use super::policy::ReaperPolicy;
use crate::core::{StageOutput, Task, TaskId};
use crate::errors::StageError;
use crate::stages::{Stage, StageContext};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Aggregate bucket holding removed deployments.
pub const REMOVED_BUCKET: &str = "removed";

/// Stage 1: fetches per-deployment details.
///
/// Details are recorded under the task id only if they carry a `state`.
/// A timed-out attempt drops the request future, which aborts the call.
pub struct FetchDetailsStage {
    api: Arc<dyn DeploymentApi>,
}

impl FetchDetailsStage {
    /// Stage name.
    pub const NAME: &'static str = "details";

    /// Creates the stage.
    #[must_use]
    pub fn new(api: Arc<dyn DeploymentApi>) -> Self {
        Self { api }
    }
}

impl std::fmt::Debug for FetchDetailsStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchDetailsStage").finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for FetchDetailsStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&self, task: &Task, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let task_id = task.id.clone();
        ctx.cancel_token().on_cancel(move || {
            debug!(task_id = %task_id, "Aborting details request");
        });

        let details = self.api.get_deployment(&task.id).await?;
        if details.state.is_none() {
            debug!(task_id = %task.id, "Details carry no state; nothing recorded");
            return Ok(StageOutput::Empty);
        }

        let value = serde_json::to_value(&details).map_err(|e| StageError::rejected(e.to_string()))?;
        Ok(StageOutput::result(value))
    }
}

/// Stage 2: deletes the deployment when the policy says it is stale.
pub struct RemoveStaleStage {
    api: Arc<dyn DeploymentApi>,
    policy: ReaperPolicy,
    now: DateTime<Utc>,
}

impl RemoveStaleStage {
    /// Stage name.
    pub const NAME: &'static str = "remove";

    /// Creates the stage. `now` is the snapshot every task is judged against.
    #[must_use]
    pub fn new(api: Arc<dyn DeploymentApi>, policy: ReaperPolicy, now: DateTime<Utc>) -> Self {
        Self { api, policy, now }
    }
}

impl std::fmt::Debug for RemoveStaleStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoveStaleStage")
            .field("policy", &self.policy)
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}

/// Console line announcing a removal: `Removing: <id> <host> <state> <stateTs>`.
fn removal_line(id: &TaskId, record: &RemovalRecord) -> String {
    format!(
        "Removing: {} {} {} {}",
        id,
        record.host.as_deref().unwrap_or("-"),
        record.state,
        record.state_ts
    )
}

#[async_trait]
impl Stage for RemoveStaleStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&self, task: &Task, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let Some(recorded) = ctx.results(&task.id) else {
            return Ok(StageOutput::Empty);
        };
        let details: DeploymentDetails = match serde_json::from_value(recorded) {
            Ok(details) => details,
            Err(e) => {
                debug!(task_id = %task.id, error = %e, "Unreadable details; skipping");
                return Ok(StageOutput::Empty);
            }
        };
        let Some(record) = self.policy.removal(&details, self.now) else {
            return Ok(StageOutput::Empty);
        };

        info!(
            task_id = %task.id,
            host = ?record.host,
            state = %record.state,
            state_ts = %record.state_ts,
            "{}",
            removal_line(&task.id, &record)
        );
        self.api.delete_deployment(&task.id).await?;

        let value = serde_json::to_value(&record).map_err(|e| StageError::rejected(e.to_string()))?;
        Ok(StageOutput::aggregate(REMOVED_BUCKET, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ApiError;
    use crate::reaper::api::MockDeploymentApi;
    use crate::reaper::model::StateTimestamp;
    use crate::store::ResultStore;
    use chrono::{Duration, TimeZone};
    use mockall::predicate::eq;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap()
    }

    fn ctx_with(id: &TaskId, details: Option<DeploymentDetails>) -> StageContext {
        let store = Arc::new(ResultStore::new());
        store.set(id, details.map(|d| serde_json::to_value(d).unwrap()));
        StageContext::new(RemoveStaleStage::NAME, store)
    }

    #[tokio::test]
    async fn test_fetch_records_details_with_state() {
        let mut api = MockDeploymentApi::new();
        api.expect_get_deployment()
            .with(eq(TaskId::from("a")))
            .times(1)
            .returning(|_| {
                Ok(DeploymentDetails::new("READY", StateTimestamp::Millis(1)).with_host("a.now.sh"))
            });
        let stage = FetchDetailsStage::new(Arc::new(api));
        let ctx = StageContext::new(FetchDetailsStage::NAME, Arc::new(ResultStore::new()));

        let output = stage.execute(&Task::new("a"), &ctx).await.unwrap();

        assert_eq!(
            output,
            StageOutput::result(json!({"host": "a.now.sh", "state": "READY", "stateTs": 1}))
        );
    }

    #[tokio::test]
    async fn test_fetch_without_state_records_nothing() {
        let mut api = MockDeploymentApi::new();
        api.expect_get_deployment()
            .returning(|_| Ok(DeploymentDetails::default()));
        let stage = FetchDetailsStage::new(Arc::new(api));
        let ctx = StageContext::new(FetchDetailsStage::NAME, Arc::new(ResultStore::new()));

        assert!(stage.execute(&Task::new("a"), &ctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_error_rejects() {
        let mut api = MockDeploymentApi::new();
        api.expect_get_deployment()
            .returning(|_| Err(ApiError::status(502, "deployments/a")));
        let stage = FetchDetailsStage::new(Arc::new(api));
        let ctx = StageContext::new(FetchDetailsStage::NAME, Arc::new(ResultStore::new()));

        let err = stage.execute(&Task::new("a"), &ctx).await.unwrap_err();
        assert_eq!(err, StageError::Api(ApiError::status(502, "deployments/a")));
    }

    #[tokio::test]
    async fn test_frozen_deployment_deleted_once() {
        let id = TaskId::from("c");
        let state_ts = StateTimestamp::from_datetime(now() - Duration::days(101));
        let details = DeploymentDetails::new("FROZEN", state_ts.clone()).with_host("c.now.sh");

        let mut api = MockDeploymentApi::new();
        api.expect_delete_deployment()
            .with(eq(id.clone()))
            .times(1)
            .returning(|_| Ok(()));
        let stage = RemoveStaleStage::new(Arc::new(api), ReaperPolicy::default(), now());

        let output = stage
            .execute(&Task::new(id.clone()), &ctx_with(&id, Some(details)))
            .await
            .unwrap();

        assert_eq!(
            output,
            StageOutput::aggregate(
                REMOVED_BUCKET,
                json!({"host": "c.now.sh", "state": "FROZEN", "stateTs": serde_json::to_value(&state_ts).unwrap()})
            )
        );
    }

    #[test]
    fn test_removal_line_echoes_raw_timestamp() {
        let record = RemovalRecord {
            host: Some("e.now.sh".to_string()),
            state: "DEPLOYMENT_ERROR".to_string(),
            state_ts: StateTimestamp::Millis(1_775_088_000_000),
        };
        assert_eq!(
            removal_line(&TaskId::from("e"), &record),
            "Removing: e e.now.sh DEPLOYMENT_ERROR 1775088000000"
        );

        let record = RemovalRecord {
            host: None,
            state_ts: StateTimestamp::Text("2026-04-02T00:00:00Z".to_string()),
            ..record
        };
        assert_eq!(
            removal_line(&TaskId::from("e"), &record),
            "Removing: e - DEPLOYMENT_ERROR 2026-04-02T00:00:00Z"
        );
    }

    #[tokio::test]
    async fn test_ready_deployment_not_deleted() {
        let id = TaskId::from("r");
        let details = DeploymentDetails::new(
            "READY",
            StateTimestamp::from_datetime(now() - Duration::days(900)),
        );

        let mut api = MockDeploymentApi::new();
        api.expect_delete_deployment().never();
        let stage = RemoveStaleStage::new(Arc::new(api), ReaperPolicy::default(), now());

        let output = stage
            .execute(&Task::new(id.clone()), &ctx_with(&id, Some(details)))
            .await
            .unwrap();
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_missing_details_not_deleted() {
        let id = TaskId::from("m");
        let mut api = MockDeploymentApi::new();
        api.expect_delete_deployment().never();
        let stage = RemoveStaleStage::new(Arc::new(api), ReaperPolicy::default(), now());

        let output = stage
            .execute(&Task::new(id.clone()), &ctx_with(&id, None))
            .await
            .unwrap();
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_failed_delete_rejects() {
        let id = TaskId::from("e");
        let details = DeploymentDetails::new(
            "DEPLOYMENT_ERROR",
            StateTimestamp::from_datetime(now() - Duration::days(200)),
        );

        let mut api = MockDeploymentApi::new();
        api.expect_delete_deployment()
            .returning(|_| Err(ApiError::transport("deployments/e", "reset")));
        let stage = RemoveStaleStage::new(Arc::new(api), ReaperPolicy::default(), now());

        let err = stage
            .execute(&Task::new(id.clone()), &ctx_with(&id, Some(details)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "api");
    }
}
