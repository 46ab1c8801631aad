//! JSON bodies exchanged over the `/api` surface.
//!
//! Shared by the axum handlers and the HTTP client so both ends agree on the
//! wire shape. Keys are camelCase.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ConfigDocument;
use crate::error::ManagerError;
use crate::validate::ValidationError;

/// Request body of `POST /api/mcp-config` and `POST /api/validate-config`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigRequest {
    #[serde(default)]
    pub config: Option<Value>,
}

/// `GET /api/mcp-config` success body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEnvelope {
    pub success: bool,
    pub data: ConfigDocument,
    pub path: String,
}

/// `POST /api/mcp-config` success body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedResponse {
    pub success: bool,
    pub message: String,
    pub path: String,
}

/// Plain confirmation, used by `POST /api/validate-config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

/// `POST /api/start-server` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartResponse {
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub port: u16,
    pub url: String,
}

/// `POST /api/shutdown` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownResponse {
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// `GET /api/health` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub config_path: String,
    pub port: u16,
    /// Seconds since the service started.
    pub uptime: f64,
}

/// Failure body: `{ success: false, error | errors, path? }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ErrorBody {
    /// Human-readable summary: the single error, or all errors joined.
    pub fn summary(&self) -> String {
        match (&self.errors, &self.error) {
            (Some(errors), _) if !errors.is_empty() => errors.join(", "),
            (_, Some(error)) => error.clone(),
            _ => "request failed".to_string(),
        }
    }
}

/// A failed request: status code plus JSON error body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn bad_request(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody {
                error: Some(error.into()),
                ..Default::default()
            },
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.body.path = Some(path.into());
        self
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        let body = match err {
            ValidationError::Shape(error) => ErrorBody {
                error: Some(error),
                ..Default::default()
            },
            ValidationError::Entries(errors) => ErrorBody {
                errors: Some(errors),
                ..Default::default()
            },
        };
        Self {
            status: StatusCode::BAD_REQUEST,
            body,
        }
    }
}

impl From<ManagerError> for ApiError {
    fn from(err: ManagerError) -> Self {
        let path = err.path().map(|p| p.display().to_string());
        let mut api = match err {
            ManagerError::Validation(validation) => ApiError::from(validation),
            other => {
                let status = match &other {
                    ManagerError::NotFound(_) => StatusCode::NOT_FOUND,
                    ManagerError::Empty(_) | ManagerError::Parse { .. } => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                Self {
                    status,
                    body: ErrorBody {
                        error: Some(other.to_string()),
                        ..Default::default()
                    },
                }
            }
        };
        api.body.path = path;
        api
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
