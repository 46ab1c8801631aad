//! Request handlers for the `/api` routes.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde_json::Value;

use crate::config::ConfigDocument;
use crate::service::AppState;
use crate::service::responses::{
    ApiError, ConfigEnvelope, ConfigRequest, HealthResponse, MessageResponse, SavedResponse,
    ShutdownResponse, StartResponse,
};
use crate::validate::{ValidationError, validate};

/// `GET /api/mcp-config`
pub async fn get_config(State(state): State<AppState>) -> Result<Json<ConfigEnvelope>, ApiError> {
    let document = state.store.load().await.map_err(|e| {
        tracing::warn!(error = %e, "failed to read MCP config");
        ApiError::from(e)
    })?;

    Ok(Json(ConfigEnvelope {
        success: true,
        data: document,
        path: state.config_path_display(),
    }))
}

/// `POST /api/mcp-config`
///
/// The candidate is normalized, validated, and only then handed to the store.
pub async fn put_config(
    State(state): State<AppState>,
    Json(request): Json<ConfigRequest>,
) -> Result<Json<SavedResponse>, ApiError> {
    let path = state.config_path_display();

    let Some(candidate) = request.config.filter(|v| !v.is_null()) else {
        return Err(ApiError::bad_request("Configuration data is required"));
    };

    let mut document = ConfigDocument::from_value(candidate).ok_or_else(|| {
        ApiError::from(ValidationError::Shape(
            "Invalid configuration format".to_string(),
        ))
        .with_path(path.clone())
    })?;
    document.normalize_servers();

    if let Err(e) = validate(&document.to_value()) {
        tracing::warn!(error = %e, "rejected invalid MCP config write");
        return Err(ApiError::from(e).with_path(path));
    }

    let written = state.store.save(&document).await.map_err(ApiError::from)?;

    Ok(Json(SavedResponse {
        success: true,
        message: "Configuration updated successfully".to_string(),
        path: written.display().to_string(),
    }))
}

/// `POST /api/validate-config`
pub async fn validate_config(
    Json(request): Json<ConfigRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    validate(request.config.as_ref().unwrap_or(&Value::Null))?;

    Ok(Json(MessageResponse {
        success: true,
        message: "Configuration is valid".to_string(),
    }))
}

/// `POST /api/start-server`. The process already runs, so this only confirms.
pub async fn start_server(State(state): State<AppState>) -> Json<StartResponse> {
    tracing::info!("server start request received");

    Json(StartResponse {
        success: true,
        message: "Server is already running".to_string(),
        timestamp: Utc::now(),
        port: state.port,
        url: format!("http://localhost:{}", state.port),
    })
}

/// `POST /api/shutdown`: acknowledge, then stop after the grace delay.
///
/// Not abortable once invoked.
pub async fn shutdown(State(state): State<AppState>) -> Json<ShutdownResponse> {
    tracing::info!(grace_ms = state.shutdown_grace.as_millis() as u64, "shutdown request received");

    let token = state.shutdown.clone();
    let grace = state.shutdown_grace;
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        tracing::info!("shutting down MCP Manager server");
        token.cancel();
    });

    Json(ShutdownResponse {
        success: true,
        message: "Server shutdown initiated".to_string(),
        timestamp: Utc::now(),
    })
}

/// `GET /api/health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        message: "MCP Manager API is running".to_string(),
        timestamp: Utc::now(),
        config_path: state.config_path_display(),
        port: state.port,
        uptime: state.started.elapsed().as_secs_f64(),
    })
}
