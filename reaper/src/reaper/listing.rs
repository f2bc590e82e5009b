//! Collecting the task set from the deployment listing.

use super::api::DeploymentApi;
use super::model::Deployment;
use crate::errors::ApiError;
use futures::StreamExt;
use std::collections::HashSet;
use tracing::{debug, error, info};

/// Drains the listing into deployments, skipping unusable records.
///
/// Records without a `url` or `uid` are skipped, and a repeated id keeps
/// its first occurrence so every task id is unique.
///
/// # Errors
///
/// Returns the first listing error; the stream is dropped at that point,
/// which aborts the in-flight listing request.
pub async fn collect_deployments(api: &dyn DeploymentApi) -> Result<Vec<Deployment>, ApiError> {
    let mut stream = api.list_deployments();
    let mut seen = HashSet::new();
    let mut deployments = Vec::new();

    while let Some(item) = stream.next().await {
        let record = match item {
            Ok(record) => record,
            Err(e) => {
                drop(stream);
                error!(error = %e, "Listing deployments failed");
                return Err(e);
            }
        };

        let Some(deployment) = Deployment::from_record(record) else {
            debug!("Skipping listing record without url or uid");
            continue;
        };
        if seen.insert(deployment.id.clone()) {
            deployments.push(deployment);
        } else {
            debug!(id = %deployment.id, "Skipping duplicate deployment");
        }
    }

    info!(count = deployments.len(), "{} deployments found", deployments.len());
    Ok(deployments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TaskId;
    use crate::reaper::api::MockDeploymentApi;
    use futures::stream;
    use serde_json::json;

    #[tokio::test]
    async fn test_collects_usable_records() {
        let mut api = MockDeploymentApi::new();
        api.expect_list_deployments().times(1).returning(|| {
            stream::iter(vec![
                Ok(json!({"uid": "a", "url": "a.now.sh"})),
                Ok(json!({"uid": "b"})),
                Ok(json!(null)),
                Ok(json!({"uid": 7, "url": "c.now.sh"})),
                Ok(json!({"uid": "a", "url": "a2.now.sh"})),
            ])
            .boxed()
        });

        let deployments = collect_deployments(&api).await.unwrap();

        let ids: Vec<_> = deployments.iter().map(|d| d.id.clone()).collect();
        assert_eq!(ids, vec![TaskId::from("a"), TaskId::from("7")]);
        assert_eq!(deployments[0].url, "a.now.sh");
    }

    #[tokio::test]
    async fn test_listing_error_is_fatal() {
        let mut api = MockDeploymentApi::new();
        api.expect_list_deployments().returning(|| {
            stream::iter(vec![
                Ok(json!({"uid": "a", "url": "a.now.sh"})),
                Err(ApiError::status(401, "deployments")),
                Ok(json!({"uid": "b", "url": "b.now.sh"})),
            ])
            .boxed()
        });

        let err = collect_deployments(&api).await.unwrap_err();
        assert_eq!(err, ApiError::status(401, "deployments"));
    }

    #[tokio::test]
    async fn test_empty_listing() {
        let mut api = MockDeploymentApi::new();
        api.expect_list_deployments()
            .returning(|| stream::empty().boxed());

        assert!(collect_deployments(&api).await.unwrap().is_empty());
    }
}
