//! Port for the remote deployment API.

use super::model::DeploymentDetails;
use crate::core::TaskId;
use crate::errors::ApiError;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// A stream of raw listing records.
///
/// The stream ending is the end signal; an `Err` item is the error signal
/// and nothing after it is read.
pub type ListingStream = BoxStream<'static, Result<serde_json::Value, ApiError>>;

/// The remote deployment API the reaper talks to.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeploymentApi: Send + Sync {
    /// Streams every known deployment record.
    fn list_deployments(&self) -> ListingStream;

    /// Fetches status details for one deployment.
    async fn get_deployment(&self, id: &TaskId) -> Result<DeploymentDetails, ApiError>;

    /// Deletes one deployment.
    async fn delete_deployment(&self, id: &TaskId) -> Result<(), ApiError>;
}
