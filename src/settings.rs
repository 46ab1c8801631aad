//! Manager settings — the tool's own TOML settings plus port resolution.
//!
//! Every field has a default, so a missing settings file is not an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::client::lifecycle::LifecycleTiming;
use crate::config::default_config_path;
use crate::error::ManagerError;

/// Port used when no flag, environment variable, or setting supplies one.
pub const DEFAULT_PORT: u16 = 3000;

/// Environment variable consulted for the listening port.
pub const PORT_ENV: &str = "PORT";

/// Settings file name searched in the working directory and config dir.
pub const SETTINGS_FILE: &str = "mcp-manager.toml";

/// Top-level manager settings, parsed from TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ManagerSettings {
    pub host: String,
    pub port: Option<u16>,
    /// Path of the managed `mcp.json`. A leading `~/` expands to home.
    pub config_path: Option<String>,
    /// Delay between acknowledging a shutdown and stopping the server.
    pub shutdown_grace_ms: u64,
    pub lifecycle: LifecycleSettings,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: None,
            config_path: None,
            shutdown_grace_ms: 1000,
            lifecycle: LifecycleSettings::default(),
        }
    }
}

/// Polling cadence for client lifecycle controllers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LifecycleSettings {
    pub probe_interval_secs: u64,
    pub start_poll_interval_ms: u64,
    pub start_max_attempts: u32,
    pub restart_poll_interval_secs: u64,
    pub restart_max_attempts: u32,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        let timing = LifecycleTiming::default();
        Self {
            probe_interval_secs: timing.probe_interval.as_secs(),
            start_poll_interval_ms: timing.start_poll_interval.as_millis() as u64,
            start_max_attempts: timing.start_max_attempts,
            restart_poll_interval_secs: timing.restart_poll_interval.as_secs(),
            restart_max_attempts: timing.restart_max_attempts,
        }
    }
}

impl LifecycleSettings {
    pub fn timing(&self) -> LifecycleTiming {
        LifecycleTiming {
            probe_interval: Duration::from_secs(self.probe_interval_secs),
            start_poll_interval: Duration::from_millis(self.start_poll_interval_ms),
            start_max_attempts: self.start_max_attempts,
            restart_poll_interval: Duration::from_secs(self.restart_poll_interval_secs),
            restart_max_attempts: self.restart_max_attempts,
        }
    }
}

impl ManagerSettings {
    /// Parse settings from TOML text and validate them.
    pub fn from_toml(text: &str) -> crate::Result<Self> {
        let settings: ManagerSettings =
            toml::from_str(text).map_err(|e| ManagerError::Settings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a file.
    pub async fn load(path: &Path) -> crate::Result<Self> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            ManagerError::Settings(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Reject settings that would make polling loops spin or never run.
    pub fn validate(&self) -> crate::Result<()> {
        let lifecycle = &self.lifecycle;
        if lifecycle.probe_interval_secs == 0
            || lifecycle.start_poll_interval_ms == 0
            || lifecycle.restart_poll_interval_secs == 0
        {
            return Err(ManagerError::Settings(
                "lifecycle intervals must be greater than zero".to_string(),
            ));
        }
        if lifecycle.start_max_attempts == 0 || lifecycle.restart_max_attempts == 0 {
            return Err(ManagerError::Settings(
                "lifecycle attempt limits must be greater than zero".to_string(),
            ));
        }
        if lifecycle.restart_poll_interval_secs.saturating_mul(1000) <= self.shutdown_grace_ms {
            return Err(ManagerError::Settings(
                "lifecycle.restart_poll_interval_secs must exceed shutdown_grace_ms".to_string(),
            ));
        }
        if self.port == Some(0) {
            return Err(ManagerError::Settings("port must be in 1..=65535".to_string()));
        }
        if self.host.trim().is_empty() {
            return Err(ManagerError::Settings("host must not be empty".to_string()));
        }
        Ok(())
    }

    /// Resolved path of the managed config file.
    pub fn config_path(&self) -> PathBuf {
        match &self.config_path {
            Some(raw) => expand_home(raw),
            None => default_config_path(),
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Resolve the settings file: explicit path → ./mcp-manager.toml →
/// `<config_dir>/mcp-manager/mcp-manager.toml`. `None` means use defaults.
pub fn resolve_settings_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if explicit.is_some() {
        return explicit;
    }

    let local = Path::new(SETTINGS_FILE);
    if local.exists() {
        return Some(local.to_path_buf());
    }

    dirs::config_dir()
        .map(|dir| dir.join("mcp-manager").join(SETTINGS_FILE))
        .filter(|path| path.exists())
}

/// Parse a port candidate, rejecting anything outside 1..=65535.
pub fn parse_port(raw: &str) -> Option<u16> {
    raw.trim().parse::<u16>().ok().filter(|port| *port > 0)
}

/// Pick the listening port: flag, then environment, then settings, then 3000.
///
/// Invalid or out-of-range candidates fall through to the next source.
pub fn resolve_port(flag: Option<&str>, env: Option<&str>, configured: Option<u16>) -> u16 {
    flag.and_then(parse_port)
        .or_else(|| env.and_then(parse_port))
        .or(configured.filter(|port| *port > 0))
        .unwrap_or(DEFAULT_PORT)
}

fn expand_home(raw: &str) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        None => PathBuf::from(raw),
    }
}
