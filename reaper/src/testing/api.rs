//! In-memory deployment API.

use crate::core::TaskId;
use crate::errors::ApiError;
use crate::reaper::{DeploymentApi, DeploymentDetails, ListingStream};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

#[derive(Debug, Default)]
struct State {
    listing: Vec<Value>,
    listing_error: Option<ApiError>,
    details: HashMap<TaskId, DeploymentDetails>,
    details_failures: HashMap<TaskId, usize>,
    details_delays: HashMap<TaskId, Duration>,
    delete_failures: HashSet<TaskId>,
    details_calls: HashMap<TaskId, usize>,
    deleted: Vec<TaskId>,
    list_calls: usize,
}

/// A [`DeploymentApi`] backed by a map, with scripted failures and delays.
///
/// Unknown ids answer with a 404 status error.
#[derive(Debug, Default)]
pub struct InMemoryDeploymentApi {
    state: Mutex<State>,
}

impl InMemoryDeploymentApi {
    /// Creates an empty API.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a deployment to the listing along with its details.
    #[must_use]
    pub fn with_deployment(mut self, id: impl Into<TaskId>, details: DeploymentDetails) -> Self {
        let id = id.into();
        let state = self.state.get_mut();
        state
            .listing
            .push(json!({"uid": id.as_str(), "url": format!("{id}.now.sh")}));
        state.details.insert(id, details);
        self
    }

    /// Adds a raw listing record with no details behind it.
    #[must_use]
    pub fn with_record(mut self, record: Value) -> Self {
        self.state.get_mut().listing.push(record);
        self
    }

    /// Ends the listing with an error after the records.
    #[must_use]
    pub fn with_listing_error(mut self, error: ApiError) -> Self {
        self.state.get_mut().listing_error = Some(error);
        self
    }

    /// Makes the first `failures` detail lookups of a deployment fail.
    #[must_use]
    pub fn with_details_failures(mut self, id: impl Into<TaskId>, failures: usize) -> Self {
        self.state.get_mut().details_failures.insert(id.into(), failures);
        self
    }

    /// Delays the first detail lookup of a deployment.
    #[must_use]
    pub fn with_details_delay(mut self, id: impl Into<TaskId>, delay: Duration) -> Self {
        self.state.get_mut().details_delays.insert(id.into(), delay);
        self
    }

    /// Makes every deletion of a deployment fail.
    #[must_use]
    pub fn with_delete_failure(mut self, id: impl Into<TaskId>) -> Self {
        self.state.get_mut().delete_failures.insert(id.into());
        self
    }

    /// Returns the deleted ids in deletion order.
    #[must_use]
    pub fn deleted(&self) -> Vec<TaskId> {
        self.state.lock().deleted.clone()
    }

    /// Returns how many times the listing was requested.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.state.lock().list_calls
    }

    /// Returns how many detail lookups a deployment received.
    #[must_use]
    pub fn details_calls(&self, id: &TaskId) -> usize {
        self.state.lock().details_calls.get(id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl DeploymentApi for InMemoryDeploymentApi {
    fn list_deployments(&self) -> ListingStream {
        let mut state = self.state.lock();
        state.list_calls += 1;

        let mut items: Vec<Result<Value, ApiError>> =
            state.listing.iter().cloned().map(Ok).collect();
        if let Some(error) = state.listing_error.clone() {
            items.push(Err(error));
        }
        stream::iter(items).boxed()
    }

    async fn get_deployment(&self, id: &TaskId) -> Result<DeploymentDetails, ApiError> {
        let path = format!("deployments/{id}");
        let (delay, fail, details) = {
            let mut state = self.state.lock();
            let calls = state.details_calls.entry(id.clone()).or_insert(0);
            *calls += 1;
            let first = *calls == 1;

            let delay = if first {
                state.details_delays.get(id).copied()
            } else {
                None
            };
            let fail = match state.details_failures.get_mut(id) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            };
            (delay, fail, state.details.get(id).cloned())
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(ApiError::status(503, path));
        }
        details.ok_or_else(|| ApiError::status(404, path))
    }

    async fn delete_deployment(&self, id: &TaskId) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        if state.delete_failures.contains(id) {
            return Err(ApiError::status(500, format!("deployments/{id}")));
        }
        if !state.details.contains_key(id) {
            return Err(ApiError::status(404, format!("deployments/{id}")));
        }
        state.deleted.push(id.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reaper::StateTimestamp;

    fn details() -> DeploymentDetails {
        DeploymentDetails::new("FROZEN", StateTimestamp::Millis(0))
    }

    #[tokio::test]
    async fn test_listing_then_error() {
        let api = InMemoryDeploymentApi::new()
            .with_deployment("a", details())
            .with_listing_error(ApiError::status(500, "deployments"));

        let items: Vec<_> = api.list_deployments().collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
        assert_eq!(api.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_scripted_detail_failures() {
        let id = TaskId::from("a");
        let api = InMemoryDeploymentApi::new()
            .with_deployment("a", details())
            .with_details_failures("a", 1);

        assert!(api.get_deployment(&id).await.is_err());
        assert_eq!(api.get_deployment(&id).await.unwrap(), details());
        assert_eq!(api.details_calls(&id), 2);
    }

    #[tokio::test]
    async fn test_unknown_and_failing_deletes() {
        let api = InMemoryDeploymentApi::new()
            .with_deployment("a", details())
            .with_deployment("b", details())
            .with_delete_failure("b");

        assert!(api.delete_deployment(&TaskId::from("missing")).await.is_err());
        assert!(api.delete_deployment(&TaskId::from("b")).await.is_err());
        api.delete_deployment(&TaskId::from("a")).await.unwrap();
        assert_eq!(api.deleted(), vec![TaskId::from("a")]);
    }
}
