//! Scripted in-memory `ManagerApi` for controller tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::client::api::{ClientError, LoadedConfig, ManagerApi};
use crate::config::ConfigDocument;
use crate::service::responses::{HealthResponse, ShutdownResponse, StartResponse};

pub(crate) fn health_ok(uptime: f64) -> HealthResponse {
    HealthResponse {
        success: true,
        message: "MCP Manager API is running".to_string(),
        timestamp: Utc::now(),
        config_path: "/home/op/.aws/amazonq/mcp.json".to_string(),
        port: 3000,
        uptime,
    }
}

pub(crate) fn refused() -> ClientError {
    ClientError::Unreachable("connection refused".to_string())
}

#[derive(Default)]
struct FakeState {
    online: bool,
    health_script: VecDeque<bool>,
    health_calls: usize,
    shutdown_result: Option<Result<(), ClientError>>,
    shutdown_calls: usize,
    config: Option<ConfigDocument>,
    put_failures: VecDeque<ClientError>,
    written: Vec<ConfigDocument>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeApi {
    state: Arc<Mutex<FakeState>>,
}

impl FakeApi {
    pub(crate) fn online() -> Self {
        let api = Self::default();
        api.set_online(true);
        api
    }

    pub(crate) fn offline() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut guard = self.state.lock().expect("fake api lock");
        f(&mut guard)
    }

    /// Fallback health answer once the script is exhausted.
    pub(crate) fn set_online(&self, online: bool) {
        self.with(|s| s.online = online);
    }

    /// Queue explicit health answers, consumed before the fallback.
    pub(crate) fn script_health(&self, answers: &[bool]) {
        self.with(|s| s.health_script.extend(answers.iter().copied()));
    }

    pub(crate) fn health_calls(&self) -> usize {
        self.with(|s| s.health_calls)
    }

    pub(crate) fn shutdown_calls(&self) -> usize {
        self.with(|s| s.shutdown_calls)
    }

    pub(crate) fn set_shutdown_result(&self, result: Result<(), ClientError>) {
        self.with(|s| s.shutdown_result = Some(result));
    }

    pub(crate) fn set_config(&self, document: ConfigDocument) {
        self.with(|s| s.config = Some(document));
    }

    pub(crate) fn fail_next_put(&self, err: ClientError) {
        self.with(|s| s.put_failures.push_back(err));
    }

    pub(crate) fn written(&self) -> Vec<ConfigDocument> {
        self.with(|s| s.written.clone())
    }
}

impl ManagerApi for FakeApi {
    async fn health(&self) -> Result<HealthResponse, ClientError> {
        self.with(|s| {
            s.health_calls += 1;
            let up = s.health_script.pop_front().unwrap_or(s.online);
            if up { Ok(health_ok(120.0)) } else { Err(refused()) }
        })
    }

    async fn shutdown(&self) -> Result<ShutdownResponse, ClientError> {
        self.with(|s| {
            s.shutdown_calls += 1;
            match s.shutdown_result.clone().unwrap_or(Ok(())) {
                Ok(()) => {
                    s.online = false;
                    Ok(ShutdownResponse {
                        success: true,
                        message: "Server shutdown initiated".to_string(),
                        timestamp: Utc::now(),
                    })
                }
                Err(e) => Err(e),
            }
        })
    }

    async fn start_server(&self) -> Result<StartResponse, ClientError> {
        Ok(StartResponse {
            success: true,
            message: "Server is already running".to_string(),
            timestamp: Utc::now(),
            port: 3000,
            url: "http://localhost:3000".to_string(),
        })
    }

    async fn get_config(&self) -> Result<LoadedConfig, ClientError> {
        self.with(|s| {
            if !s.online {
                return Err(refused());
            }
            match &s.config {
                Some(document) => Ok(LoadedConfig {
                    document: document.clone(),
                    path: "/home/op/.aws/amazonq/mcp.json".to_string(),
                }),
                None => Err(ClientError::Rejected {
                    status: 404,
                    message: "MCP configuration file not found".to_string(),
                }),
            }
        })
    }

    async fn validate_config(&self, document: &ConfigDocument) -> Result<(), ClientError> {
        crate::validate::validate(&document.to_value()).map_err(|e| match e {
            crate::validate::ValidationError::Entries(errors) => ClientError::Invalid(errors),
            other => ClientError::Rejected {
                status: 400,
                message: other.to_string(),
            },
        })
    }

    async fn put_config(&self, document: &ConfigDocument) -> Result<String, ClientError> {
        self.with(|s| {
            if let Some(err) = s.put_failures.pop_front() {
                return Err(err);
            }
            s.config = Some(document.clone());
            s.written.push(document.clone());
            Ok("/home/op/.aws/amazonq/mcp.json".to_string())
        })
    }
}
