//! The `ManagerApi` seam and its `reqwest` implementation.

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::ConfigDocument;
use crate::service::responses::{
    ConfigEnvelope, ConfigRequest, ErrorBody, HealthResponse, MessageResponse, SavedResponse,
    ShutdownResponse, StartResponse,
};

/// Per-request timeout for the HTTP client.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Client-side failure talking to the Config Service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// No response at all: connection refused, reset, or timed out
    #[error("cannot reach server: {0}")]
    Unreachable(String),

    /// The service answered with a failure status
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// The service rejected the document with per-entry validation errors
    #[error("{}", .0.join(", "))]
    Invalid(Vec<String>),

    /// The response body did not have the expected shape
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ClientError::Unreachable(_))
    }
}

/// A configuration document together with the path it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedConfig {
    pub document: ConfigDocument,
    pub path: String,
}

/// Operations the client controllers need from the Config Service.
pub trait ManagerApi {
    fn health(&self) -> impl Future<Output = Result<HealthResponse, ClientError>> + Send;

    fn shutdown(&self) -> impl Future<Output = Result<ShutdownResponse, ClientError>> + Send;

    fn start_server(&self) -> impl Future<Output = Result<StartResponse, ClientError>> + Send;

    fn get_config(&self) -> impl Future<Output = Result<LoadedConfig, ClientError>> + Send;

    fn validate_config(
        &self,
        document: &ConfigDocument,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Persist `document`; resolves to the path written.
    fn put_config(
        &self,
        document: &ConfigDocument,
    ) -> impl Future<Output = Result<String, ClientError>> + Send;
}

/// Validate then persist, the write path both controllers use.
pub async fn write_through<A: ManagerApi>(
    api: &A,
    document: &ConfigDocument,
) -> Result<String, ClientError> {
    api.validate_config(document).await?;
    api.put_config(document).await
}

/// `ManagerApi` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpApi {
    /// Client for a service at `base_url`, e.g. `http://localhost:3000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, route: &str) -> String {
        format!("{}/api/{}", self.base_url, route)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Unreachable(e.to_string()))?;
        decode(response).await
    }
}

/// Turn a response into `T` on success or a structured `ClientError`.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ClientError::Unreachable(e.to_string()))?;

    if status.is_success() {
        return serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()));
    }

    match serde_json::from_slice::<ErrorBody>(&bytes) {
        Ok(ErrorBody {
            errors: Some(errors),
            ..
        }) if !errors.is_empty() => Err(ClientError::Invalid(errors)),
        Ok(body) => Err(ClientError::Rejected {
            status: status.as_u16(),
            message: body.summary(),
        }),
        Err(_) => Err(ClientError::Rejected {
            status: status.as_u16(),
            message: format!("HTTP {status}"),
        }),
    }
}

impl ManagerApi for HttpApi {
    async fn health(&self) -> Result<HealthResponse, ClientError> {
        let health: HealthResponse = self.send(self.client.get(self.url("health"))).await?;
        if !health.success {
            return Err(ClientError::Rejected {
                status: 200,
                message: health.message,
            });
        }
        Ok(health)
    }

    async fn shutdown(&self) -> Result<ShutdownResponse, ClientError> {
        self.send(self.client.post(self.url("shutdown"))).await
    }

    async fn start_server(&self) -> Result<StartResponse, ClientError> {
        self.send(self.client.post(self.url("start-server"))).await
    }

    async fn get_config(&self) -> Result<LoadedConfig, ClientError> {
        let envelope: ConfigEnvelope = self.send(self.client.get(self.url("mcp-config"))).await?;
        Ok(LoadedConfig {
            document: envelope.data,
            path: envelope.path,
        })
    }

    async fn validate_config(&self, document: &ConfigDocument) -> Result<(), ClientError> {
        let body = ConfigRequest {
            config: Some(document.to_value()),
        };
        let _: MessageResponse = self
            .send(self.client.post(self.url("validate-config")).json(&body))
            .await?;
        Ok(())
    }

    async fn put_config(&self, document: &ConfigDocument) -> Result<String, ClientError> {
        let body = ConfigRequest {
            config: Some(document.to_value()),
        };
        let saved: SavedResponse = self
            .send(self.client.post(self.url("mcp-config")).json(&body))
            .await?;
        Ok(saved.path)
    }
}
