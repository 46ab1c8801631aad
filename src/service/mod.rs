//! Config Service — the HTTP surface over the config store and validator.
//!
//! Routes live under `/api`. Each request is independent; the only shared
//! state is the immutable [`AppState`] and the file on disk. The shutdown
//! endpoint fires the state's cancellation token after a grace delay, which
//! ends [`serve`].

pub mod handlers;
pub mod responses;

use std::time::{Duration, Instant};

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::store::ConfigStore;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: ConfigStore,
    pub port: u16,
    pub started: Instant,
    /// Cancelled by the shutdown endpoint (or Ctrl-C) to stop serving.
    pub shutdown: CancellationToken,
    pub shutdown_grace: Duration,
}

impl AppState {
    pub fn new(store: ConfigStore, port: u16, shutdown: CancellationToken) -> Self {
        Self {
            store,
            port,
            started: Instant::now(),
            shutdown,
            shutdown_grace: Duration::from_millis(1000),
        }
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    fn config_path_display(&self) -> String {
        self.store.path().display().to_string()
    }
}

/// Build the `/api` router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/mcp-config",
            get(handlers::get_config).post(handlers::put_config),
        )
        .route("/api/validate-config", post(handlers::validate_config))
        .route("/api/start-server", post(handlers::start_server))
        .route("/api/shutdown", post(handlers::shutdown))
        .route("/api/health", get(handlers::health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API on `listener` until the state's shutdown token is cancelled.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    let shutdown = state.shutdown.clone();
    let app = router(state);

    if let Ok(addr) = listener.local_addr() {
        tracing::info!(addr = %addr, "MCP Manager API listening");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    tracing::info!("MCP Manager API stopped");
    Ok(())
}
