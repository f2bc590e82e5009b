//! HTTP implementation of [`DeploymentApi`] using `reqwest`.

use super::api::{DeploymentApi, ListingStream};
use super::model::DeploymentDetails;
use crate::config::ReaperConfig;
use crate::core::TaskId;
use crate::errors::{ApiError, ReaperError};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Path of the deployment collection, relative to the base URL.
const DEPLOYMENTS_PATH: &str = "deployments";

/// Deployment API client.
///
/// Uses a reusable `reqwest::Client` with connection pooling and the
/// configured request timeout; authentication is a bearer token.
#[derive(Clone)]
pub struct NowClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl NowClient {
    /// Creates a client from the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is missing or the client cannot be built.
    pub fn new(config: &ReaperConfig) -> Result<Self, ReaperError> {
        config.validate_with_token()?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("deploy-reaper/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ReaperError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    /// Returns the absolute URL for an API path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn deployment_path(id: &TaskId) -> String {
        format!("{DEPLOYMENTS_PATH}/{id}")
    }

    async fn send(&self, request: reqwest::RequestBuilder, path: &str) -> Result<reqwest::Response, ApiError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ApiError::transport(path, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::status(status.as_u16(), path));
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.send(self.http.get(self.url(path)), path).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::transport(path, e.to_string()))?;

        serde_json::from_slice(&bytes).map_err(|e| ApiError::decode(path, e.to_string()))
    }
}

impl std::fmt::Debug for NowClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NowClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Pulls the records out of a listing body: either a bare array or an
/// object with a `deployments` array.
fn listing_records(body: Value) -> Result<Vec<Value>, ApiError> {
    match body {
        Value::Array(records) => Ok(records),
        Value::Object(mut fields) => match fields.remove(DEPLOYMENTS_PATH) {
            Some(Value::Array(records)) => Ok(records),
            _ => Err(ApiError::decode(DEPLOYMENTS_PATH, "missing `deployments` array")),
        },
        _ => Err(ApiError::decode(DEPLOYMENTS_PATH, "unexpected listing body")),
    }
}

#[async_trait]
impl DeploymentApi for NowClient {
    fn list_deployments(&self) -> ListingStream {
        let client = self.clone();
        stream::once(async move {
            let body: Value = client.get_json(DEPLOYMENTS_PATH).await?;
            listing_records(body)
        })
        .flat_map(|page| match page {
            Ok(records) => stream::iter(records.into_iter().map(Ok).collect::<Vec<_>>()),
            Err(e) => stream::iter(vec![Err(e)]),
        })
        .boxed()
    }

    async fn get_deployment(&self, id: &TaskId) -> Result<DeploymentDetails, ApiError> {
        self.get_json(&Self::deployment_path(id)).await
    }

    async fn delete_deployment(&self, id: &TaskId) -> Result<(), ApiError> {
        let path = Self::deployment_path(id);
        self.send(self.http.delete(self.url(&path)), &path).await?;
        Ok(())
    }
}
