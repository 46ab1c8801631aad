//! MCP Manager — serve the config dashboard API, or drive it from the terminal.
//!
//! - `mcp-manager serve`: HTTP API over the managed `mcp.json`
//! - `mcp-manager status | list | toggle | enable-all | disable-all | stop | monitor`:
//!   client commands against a running instance

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use mcp_manager::client::dashboard::{DashboardView, lifecycle_message};
use mcp_manager::client::lifecycle::{
    LifecycleModel, LifecycleMsg, LifecycleState, format_uptime, view as lifecycle_view,
};
use mcp_manager::settings::PORT_ENV;
use mcp_manager::{
    AppState, ConfigStore, Dashboard, DashboardMsg, HttpApi, LifecycleController, LifecycleEvent,
    ManagerApi, ManagerSettings, Notice, NoticeLevel, ServerFilter, UserAction, resolve_port,
    resolve_settings_path,
};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// MCP Manager — toggle MCP servers in mcp.json from a local dashboard.
#[derive(Parser)]
#[command(
    name = "mcp-manager",
    version,
    about = "MCP Manager — toggle MCP servers in mcp.json from a local dashboard"
)]
struct Cli {
    /// Path to mcp-manager.toml [default: ./mcp-manager.toml or ~/.config/mcp-manager/mcp-manager.toml]
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,

    /// Base URL of a running instance [default: http://localhost:<port>]
    #[arg(long, global = true)]
    url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the JSON API over the managed mcp.json
    Serve {
        /// Path to the managed mcp.json [default: ~/.aws/amazonq/mcp.json]
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// HTTP port to listen on (falls back to $PORT, then settings, then 3000)
        #[arg(short, long)]
        port: Option<String>,
        /// Bind address [default: settings host or 127.0.0.1]
        #[arg(long)]
        host: Option<String>,
    },
    /// Probe a running instance and print its health
    Status,
    /// List configured servers
    List {
        /// Case-insensitive match on the raw or display name
        #[arg(long)]
        search: Option<String>,
        /// all, enabled, disabled, docker, or python
        #[arg(long, default_value = "all")]
        filter: ServerFilter,
    },
    /// Flip one server between enabled and disabled
    Toggle {
        /// Server name as it appears under mcpServers
        name: String,
    },
    /// Enable every server
    EnableAll,
    /// Disable every server
    DisableAll,
    /// Ask the service to shut down, then watch for a restart
    Stop {
        /// Exit right after the shutdown is acknowledged
        #[arg(long)]
        no_watch: bool,
    },
    /// Track the service interactively (stdin: start, stop, refresh, quit)
    Monitor,
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = load_settings(cli.settings.clone()).await?;
    let cancel = CancellationToken::new();

    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutting down MCP Manager...");
        cancel_for_signal.cancel();
    });

    let env_port = std::env::var(PORT_ENV).ok();
    let client = || {
        let url = cli.url.clone().unwrap_or_else(|| {
            let port = resolve_port(None, env_port.as_deref(), settings.port);
            format!("http://localhost:{port}")
        });
        HttpApi::new(url)
    };

    match &cli.command {
        Commands::Serve { config, port, host } => {
            let port = resolve_port(port.as_deref(), env_port.as_deref(), settings.port);
            let host = host.clone().unwrap_or_else(|| settings.host.clone());
            let config = config.clone().unwrap_or_else(|| settings.config_path());
            run_serve(&settings, config, host, port, cancel).await?;
        }
        Commands::Status => run_status(&client()).await?,
        Commands::List { search, filter } => {
            let mut dashboard = load_dashboard(client()).await?;
            if let Some(search) = search {
                dashboard
                    .dispatch(DashboardMsg::SearchChanged(search.clone()))
                    .await;
            }
            dashboard.dispatch(DashboardMsg::FilterChanged(*filter)).await;
            print_servers(&dashboard.view(Utc::now()));
        }
        Commands::Toggle { name } => {
            let mut dashboard = load_dashboard(client()).await?;
            let known = dashboard
                .model()
                .document
                .as_ref()
                .is_some_and(|doc| doc.is_enabled(name).is_some());
            if !known {
                anyhow::bail!("No server named '{}' in the configuration", name);
            }
            report(dashboard.dispatch(DashboardMsg::ToggleRequested(name.clone())).await)?;
        }
        Commands::EnableAll => {
            let mut dashboard = load_dashboard(client()).await?;
            report(dashboard.dispatch(DashboardMsg::BulkRequested { disable: false }).await)?;
        }
        Commands::DisableAll => {
            let mut dashboard = load_dashboard(client()).await?;
            report(dashboard.dispatch(DashboardMsg::BulkRequested { disable: true }).await)?;
        }
        Commands::Stop { no_watch } => run_stop(client(), &settings, *no_watch, cancel).await?,
        Commands::Monitor => run_monitor(client(), &settings, cancel).await?,
    }

    Ok(())
}

/// Load settings from the resolved path, or fall back to defaults.
async fn load_settings(explicit: Option<PathBuf>) -> Result<ManagerSettings> {
    match resolve_settings_path(explicit) {
        Some(path) => {
            let settings = ManagerSettings::load(&path)
                .await
                .with_context(|| format!("Failed to load settings from {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded settings");
            Ok(settings)
        }
        None => Ok(ManagerSettings::default()),
    }
}

/// Bind and serve until the shutdown endpoint or Ctrl-C cancels the token.
async fn run_serve(
    settings: &ManagerSettings,
    config_path: PathBuf,
    host: String,
    port: u16,
    cancel: CancellationToken,
) -> Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;

    tracing::info!(config = %config_path.display(), "Managing MCP configuration");
    tracing::info!("Dashboard API available at http://localhost:{}/api", port);

    let state = AppState::new(ConfigStore::new(config_path), port, cancel)
        .with_shutdown_grace(settings.shutdown_grace());

    mcp_manager::serve(listener, state)
        .await
        .map_err(|e| anyhow::anyhow!("MCP Manager HTTP server error: {}", e))
}

async fn run_status(api: &HttpApi) -> Result<()> {
    let health = api
        .health()
        .await
        .map_err(|e| anyhow::anyhow!("Server offline at {}: {}", api.base_url(), e))?;
    let uptime = chrono::TimeDelta::try_milliseconds((health.uptime.max(0.0) * 1000.0) as i64)
        .unwrap_or_else(chrono::TimeDelta::zero);
    let started = api
        .start_server()
        .await
        .map_err(|e| {
            anyhow::anyhow!("Server at {} did not confirm it is running: {}", api.base_url(), e)
        })?;
    println!("Server Online ({})", started.message);
    println!("  url:     {}", started.url);
    println!("  port:    {}", health.port);
    println!("  config:  {}", health.config_path);
    println!("  uptime:  {}", format_uptime(uptime));
    Ok(())
}

async fn load_dashboard(api: HttpApi) -> Result<Dashboard<HttpApi>> {
    let mut dashboard = Dashboard::new(api);
    report(dashboard.dispatch(DashboardMsg::LoadRequested).await)?;
    Ok(dashboard)
}

/// Print notices; fail if any of them is an error.
fn report(notices: Vec<Notice>) -> Result<()> {
    let mut failure = None;
    for notice in notices {
        print_notice(&notice);
        if notice.level == NoticeLevel::Error {
            failure = Some(notice.message);
        }
    }
    match failure {
        Some(message) => Err(anyhow::anyhow!(message)),
        None => Ok(()),
    }
}

fn print_notice(notice: &Notice) {
    let line = format!("[{}] {}", notice.level.as_str(), notice.message);
    match notice.level {
        NoticeLevel::Error | NoticeLevel::Warning => eprintln!("{line}"),
        _ => println!("{line}"),
    }
}

fn print_stats(view: &DashboardView) {
    let stats = &view.stats;
    println!(
        "{} servers: {} enabled, {} disabled",
        stats.total, stats.enabled, stats.disabled
    );
}

fn print_servers(view: &DashboardView) {
    print_stats(view);

    if let Some(hint) = &view.empty_hint {
        println!("No servers found. {hint}");
        return;
    }

    for row in &view.rows {
        let mark = if row.enabled { "on " } else { "off" };
        println!("  [{mark}] {} ({})", row.display_name, row.name);
        println!("        {}: {} {}", row.kind_label, row.command, row.args_summary);
        println!(
            "        env vars: {}  auto-approve: {}  uptime: {}",
            row.env_count, row.auto_approve_count, row.uptime
        );
    }
}

/// Shut down the service, then wait out the bounded restart watch.
async fn run_stop(
    api: HttpApi,
    settings: &ManagerSettings,
    no_watch: bool,
    cancel: CancellationToken,
) -> Result<()> {
    let mut controller = LifecycleController::new(api, settings.lifecycle.timing());
    print_events(controller.dispatch(LifecycleMsg::Opened).await);
    require_online(controller.model())?;
    print_events(controller.dispatch(LifecycleMsg::StopRequested).await);

    if no_watch {
        return Ok(());
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            kind = controller.wait_for_poll() => match kind {
                Some(kind) => print_events(controller.dispatch(LifecycleMsg::PollDue(kind)).await),
                None => break,
            },
        }
    }

    let rendered = lifecycle_view(controller.model(), Utc::now());
    println!("{}: {}", rendered.status_text, rendered.description);
    Ok(())
}

/// A stop is only sent to a service the initial probe found online.
fn require_online(model: &LifecycleModel) -> Result<()> {
    if model.state != LifecycleState::Online {
        let rendered = lifecycle_view(model, Utc::now());
        anyhow::bail!("Cannot stop: {} ({})", rendered.status_text, rendered.description);
    }
    Ok(())
}

fn print_events(events: Vec<LifecycleEvent>) {
    for event in events {
        if let LifecycleEvent::Notice(notice) = event {
            print_notice(&notice);
        }
    }
}

/// Run the lifecycle controller against stdin commands until `quit` or Ctrl-C.
async fn run_monitor(
    api: HttpApi,
    settings: &ManagerSettings,
    cancel: CancellationToken,
) -> Result<()> {
    let mut dashboard = Dashboard::new(api.clone());
    let controller = LifecycleController::new(api, settings.lifecycle.timing());
    let (action_tx, action_rx) = mpsc::channel(8);
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    let cancel_for_input = cancel.clone();
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let action = match line.trim() {
                "start" => UserAction::Start,
                "stop" => UserAction::Stop,
                "refresh" => UserAction::Refresh,
                "quit" | "exit" => break,
                "" => continue,
                other => {
                    eprintln!("unknown command '{other}' (start, stop, refresh, quit)");
                    continue;
                }
            };
            if action_tx.send(action).await.is_err() {
                break;
            }
        }
        cancel_for_input.cancel();
    });

    let runner = tokio::spawn(controller.run(action_rx, event_tx, cancel));

    let mut last_status = None;
    while let Some(event) = event_rx.recv().await {
        if let Some(msg) = lifecycle_message(&event) {
            for notice in dashboard.dispatch(msg).await {
                print_notice(&notice);
            }
            let view = dashboard.view(Utc::now());
            if matches!(event, LifecycleEvent::Stopped | LifecycleEvent::Restarted) {
                if let Some(entry) = view.activity.first() {
                    println!("[{}] {}: {}", entry.kind.as_str(), entry.title, entry.description);
                }
            }
            print!("{}. ", view.status_text);
            print_stats(&view);
            continue;
        }
        match event {
            LifecycleEvent::Notice(notice) => print_notice(&notice),
            LifecycleEvent::Render(view) => {
                let line = format!("{}: {}", view.status_text, view.description);
                if last_status.as_ref() != Some(&line) {
                    println!("{line} (uptime {})", view.uptime);
                    last_status = Some(line);
                }
            }
            _ => {}
        }
    }

    let model = runner.await.context("lifecycle controller task failed")?;
    tracing::debug!(state = ?model.state, "monitor finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp_manager::{ClientError, LifecycleTiming};
    use mcp_manager::client::lifecycle::{ProbeKind, update};
    use mcp_manager::service::responses::HealthResponse;

    fn opened(outcome: Result<HealthResponse, ClientError>) -> LifecycleModel {
        let now = Utc::now();
        let model = LifecycleModel::new(LifecycleTiming::default());
        let (model, _) = update(model, LifecycleMsg::Opened, now);
        let (model, _) = update(
            model,
            LifecycleMsg::HealthChecked {
                kind: ProbeKind::Initial,
                outcome,
            },
            now,
        );
        model
    }

    #[test]
    fn test_stop_requires_online_service() {
        let offline = opened(Err(ClientError::Rejected {
            status: 503,
            message: "unavailable".to_string(),
        }));
        assert_eq!(offline.state, LifecycleState::Offline);
        let err = require_online(&offline).expect_err("offline service cannot be stopped");
        assert!(err.to_string().starts_with("Cannot stop:"));

        let online = opened(Ok(HealthResponse {
            success: true,
            message: "MCP Manager API is running".to_string(),
            timestamp: Utc::now(),
            config_path: "/tmp/mcp.json".to_string(),
            port: 3000,
            uptime: 12.0,
        }));
        assert_eq!(online.state, LifecycleState::Online);
        assert!(require_online(&online).is_ok());
    }
}
