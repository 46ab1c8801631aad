//! MCP Manager — local dashboard backend for an `mcp.json` server registry.
//! Reads, validates, and rewrites the `mcpServers` map (with a backup on every
//! write), serves it over a small JSON API, and provides the client-side
//! lifecycle and dashboard controllers that drive that API.

pub mod client;
pub mod config;
pub mod error;
pub mod service;
pub mod settings;
pub mod store;
pub mod validate;

pub use client::dashboard::{Dashboard, DashboardMsg, DashboardView, ServerFilter};
pub use client::lifecycle::{
    LifecycleController, LifecycleEvent, LifecycleState, LifecycleTiming, UserAction,
};
pub use client::{ClientError, HttpApi, LoadedConfig, ManagerApi, Notice, NoticeLevel};
pub use config::{ConfigDocument, ServerEntry, default_config_path};
pub use error::{ManagerError, Result};
pub use service::{AppState, router, serve};
pub use settings::{ManagerSettings, resolve_port, resolve_settings_path};
pub use store::ConfigStore;
pub use validate::{ValidationError, validate};
