//! Dashboard Controller — the server list and its activity log.
//!
//! Mutations are written through validate-then-put on a copy of the current
//! document. The copy replaces the model's document only after the write
//! succeeds, so a failed write leaves the model exactly as it was.

use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::client::api::{ClientError, LoadedConfig, ManagerApi, write_through};
use crate::client::lifecycle::LifecycleEvent;
use crate::client::{Notice, NoticeLevel, format_time_ago};
use crate::config::{ConfigDocument, ServerEntry};

/// Activity entries kept; older ones are dropped.
pub const ACTIVITY_CAP: usize = 50;

/// Type filter applied on top of the free-text search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerFilter {
    #[default]
    All,
    Enabled,
    Disabled,
    Docker,
    Python,
}

impl ServerFilter {
    pub fn matches(&self, entry: &ServerEntry) -> bool {
        match self {
            ServerFilter::All => true,
            ServerFilter::Enabled => entry.is_enabled(),
            ServerFilter::Disabled => !entry.is_enabled(),
            ServerFilter::Docker => entry.command == "docker",
            ServerFilter::Python => matches!(entry.command.as_str(), "uvx" | "python" | "python3"),
        }
    }
}

impl FromStr for ServerFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(ServerFilter::All),
            "enabled" => Ok(ServerFilter::Enabled),
            "disabled" => Ok(ServerFilter::Disabled),
            "docker" => Ok(ServerFilter::Docker),
            "python" => Ok(ServerFilter::Python),
            other => Err(format!(
                "unknown filter '{other}' (expected all, enabled, disabled, docker, or python)"
            )),
        }
    }
}

/// How an entry is launched, judged from its command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerKind {
    Docker,
    PythonPackage,
    NodeJs,
    PythonScript,
    NpmPackage,
    Executable,
}

impl ServerKind {
    pub fn from_command(command: &str) -> Self {
        match command {
            "docker" => ServerKind::Docker,
            "uvx" => ServerKind::PythonPackage,
            "node" => ServerKind::NodeJs,
            "python" | "python3" => ServerKind::PythonScript,
            "npm" | "npx" => ServerKind::NpmPackage,
            _ => ServerKind::Executable,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ServerKind::Docker => "Docker Container",
            ServerKind::PythonPackage => "Python Package",
            ServerKind::NodeJs => "Node.js",
            ServerKind::PythonScript => "Python Script",
            ServerKind::NpmPackage => "NPM Package",
            ServerKind::Executable => "Executable",
        }
    }
}

fn affix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^awslabs\.|-mcp-server$").expect("valid regex"))
}

fn separator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[-.]").expect("valid regex"))
}

/// `awslabs.aws-docs-mcp-server` → `Aws Docs`.
pub fn display_name(name: &str) -> String {
    let trimmed = affix_re().replace_all(name, "");
    separator_re()
        .split(&trimmed)
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// First two args, then `+N more`; `None` when there are no args.
pub fn args_summary(args: &[String]) -> String {
    match args.len() {
        0 => "None".to_string(),
        1 | 2 => args.join(" "),
        n => format!("{} +{} more", args[..2].join(" "), n - 2),
    }
}

/// Per-row uptime: `Xd Yh`, `Xh Ym`, `Xm`, or `Just started`.
pub fn format_row_uptime(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - since).num_minutes().max(0);
    let hours = minutes / 60;
    let days = hours / 24;
    if days > 0 {
        format!("{}d {}h", days, hours % 24)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{minutes}m")
    } else {
        "Just started".to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Loading,
    Connected,
    Refreshing,
    Disconnected,
    Error,
}

impl ConnectionStatus {
    pub fn text(&self) -> &'static str {
        match self {
            ConnectionStatus::Loading => "Loading...",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Refreshing => "Refreshing...",
            ConnectionStatus::Disconnected => "Server Offline",
            ConnectionStatus::Error => "Connection Error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Enabled,
    Disabled,
    BulkEnabled,
    BulkDisabled,
    Refresh,
    Shutdown,
    Restart,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Enabled => "enabled",
            ActivityKind::Disabled => "disabled",
            ActivityKind::BulkEnabled => "bulk-enabled",
            ActivityKind::BulkDisabled => "bulk-disabled",
            ActivityKind::Refresh => "refresh",
            ActivityKind::Shutdown => "shutdown",
            ActivityKind::Restart => "restart",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub kind: ActivityKind,
    pub title: String,
    pub description: String,
    pub at: DateTime<Utc>,
}

/// A write awaiting its outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Toggle { name: String, enabled: bool },
    Bulk { disable: bool },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DashboardModel {
    pub document: Option<ConfigDocument>,
    pub config_path: Option<String>,
    pub status: ConnectionStatus,
    /// A write is in flight; further mutations are ignored.
    pub busy: bool,
    pub search: String,
    pub filter: ServerFilter,
    /// Newest first.
    pub activity: VecDeque<Activity>,
    /// When each server was first seen enabled, for the per-row uptime.
    pub first_seen: HashMap<String, DateTime<Utc>>,
    pub pending: Option<(Mutation, ConfigDocument)>,
    pub refreshing: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DashboardMsg {
    LoadRequested,
    RefreshRequested,
    Loaded(Result<LoadedConfig, ClientError>),
    SearchChanged(String),
    FilterChanged(ServerFilter),
    ToggleRequested(String),
    BulkRequested { disable: bool },
    WriteFinished(Result<String, ClientError>),
    ActivityCleared,
    /// The lifecycle controller saw the service go away.
    ServerWentOffline,
    /// The lifecycle controller saw the service return.
    ServerCameBack,
    /// A stop requested from this client was acknowledged.
    ServerShutdown,
    /// The service came back after a stop.
    ServerRestarted,
}

/// The dashboard message a lifecycle event implies, if any.
pub fn lifecycle_message(event: &LifecycleEvent) -> Option<DashboardMsg> {
    match event {
        LifecycleEvent::Reload => Some(DashboardMsg::ServerCameBack),
        LifecycleEvent::WentOffline => Some(DashboardMsg::ServerWentOffline),
        LifecycleEvent::Stopped => Some(DashboardMsg::ServerShutdown),
        LifecycleEvent::Restarted => Some(DashboardMsg::ServerRestarted),
        LifecycleEvent::Notice(_) | LifecycleEvent::Render(_) => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DashboardCommand {
    FetchConfig,
    WriteConfig(ConfigDocument),
    Notify(Notice),
}

fn push_activity(
    model: &mut DashboardModel,
    kind: ActivityKind,
    title: String,
    description: String,
    now: DateTime<Utc>,
) {
    model.activity.push_front(Activity {
        kind,
        title,
        description,
        at: now,
    });
    model.activity.truncate(ACTIVITY_CAP);
}

fn notify(level: NoticeLevel, message: String, now: DateTime<Utc>) -> DashboardCommand {
    DashboardCommand::Notify(Notice::new(level, message, now))
}

/// Apply one message; pure.
pub fn update(
    mut model: DashboardModel,
    msg: DashboardMsg,
    now: DateTime<Utc>,
) -> (DashboardModel, Vec<DashboardCommand>) {
    let mut commands = Vec::new();

    match msg {
        DashboardMsg::LoadRequested | DashboardMsg::ServerCameBack => {
            model.status = ConnectionStatus::Loading;
            commands.push(DashboardCommand::FetchConfig);
        }
        DashboardMsg::RefreshRequested => {
            model.status = ConnectionStatus::Refreshing;
            model.refreshing = true;
            commands.push(DashboardCommand::FetchConfig);
        }
        DashboardMsg::Loaded(Ok(loaded)) => {
            for name in loaded.document.server_names() {
                model.first_seen.entry(name.to_string()).or_insert(now);
            }
            model.document = Some(loaded.document);
            model.config_path = Some(loaded.path);
            model.status = ConnectionStatus::Connected;
            if std::mem::take(&mut model.refreshing) {
                commands.push(notify(
                    NoticeLevel::Success,
                    "Servers refreshed successfully".to_string(),
                    now,
                ));
                push_activity(
                    &mut model,
                    ActivityKind::Refresh,
                    "Servers refreshed".to_string(),
                    "Configuration reloaded from disk".to_string(),
                    now,
                );
            }
        }
        DashboardMsg::Loaded(Err(e)) => {
            model.status = ConnectionStatus::Error;
            model.refreshing = false;
            let message = if e.is_unreachable() {
                "Cannot connect to server. Make sure the backend is running.".to_string()
            } else {
                format!("Failed to load MCP servers: {e}")
            };
            commands.push(notify(NoticeLevel::Error, message, now));
        }
        DashboardMsg::SearchChanged(search) => model.search = search,
        DashboardMsg::FilterChanged(filter) => model.filter = filter,
        DashboardMsg::ToggleRequested(name) => {
            if model.busy {
                return (model, commands);
            }
            let Some(mut candidate) = model.document.clone() else {
                return (model, commands);
            };
            if let Some(disabled) = candidate.toggle(&name) {
                model.busy = true;
                model.pending = Some((
                    Mutation::Toggle {
                        name,
                        enabled: !disabled,
                    },
                    candidate.clone(),
                ));
                commands.push(DashboardCommand::WriteConfig(candidate));
            }
        }
        DashboardMsg::BulkRequested { disable } => {
            if model.busy {
                return (model, commands);
            }
            let Some(mut candidate) = model.document.clone() else {
                return (model, commands);
            };
            candidate.set_all_disabled(disable);
            model.busy = true;
            model.pending = Some((Mutation::Bulk { disable }, candidate.clone()));
            commands.push(DashboardCommand::WriteConfig(candidate));
        }
        DashboardMsg::WriteFinished(result) => {
            model.busy = false;
            if let Some((mutation, candidate)) = model.pending.take() {
                finish_write(&mut model, mutation, candidate, result, now, &mut commands);
            }
        }
        DashboardMsg::ActivityCleared => model.activity.clear(),
        DashboardMsg::ServerWentOffline => model.status = ConnectionStatus::Disconnected,
        DashboardMsg::ServerShutdown => {
            model.status = ConnectionStatus::Disconnected;
            push_activity(
                &mut model,
                ActivityKind::Shutdown,
                "Server shutdown initiated".to_string(),
                "Graceful server shutdown requested by user".to_string(),
                now,
            );
        }
        DashboardMsg::ServerRestarted => push_activity(
            &mut model,
            ActivityKind::Restart,
            "Server restarted".to_string(),
            "Server came back online and dashboard reconnected".to_string(),
            now,
        ),
    }

    (model, commands)
}

fn finish_write(
    model: &mut DashboardModel,
    mutation: Mutation,
    candidate: ConfigDocument,
    result: Result<String, ClientError>,
    now: DateTime<Utc>,
    commands: &mut Vec<DashboardCommand>,
) {
    match (mutation, result) {
        (Mutation::Toggle { name, enabled }, Ok(_)) => {
            let shown = display_name(&name);
            let action = if enabled { "enabled" } else { "disabled" };
            if enabled {
                model.first_seen.insert(name.clone(), now);
            }
            model.document = Some(candidate);
            commands.push(notify(
                NoticeLevel::Success,
                format!("{shown} {action} successfully"),
                now,
            ));
            let kind = if enabled {
                ActivityKind::Enabled
            } else {
                ActivityKind::Disabled
            };
            push_activity(
                model,
                kind,
                format!("{shown} {action}"),
                format!("Server {action} by user"),
                now,
            );
        }
        (Mutation::Toggle { name, .. }, Err(e)) => {
            commands.push(notify(
                NoticeLevel::Error,
                format!("Failed to toggle {}: {e}", display_name(&name)),
                now,
            ));
        }
        (Mutation::Bulk { disable }, Ok(_)) => {
            let action = if disable { "disabled" } else { "enabled" };
            if !disable {
                for name in candidate.server_names() {
                    model.first_seen.insert(name.to_string(), now);
                }
            }
            model.document = Some(candidate);
            commands.push(notify(
                NoticeLevel::Success,
                format!("All servers {action} successfully"),
                now,
            ));
            let kind = if disable {
                ActivityKind::BulkDisabled
            } else {
                ActivityKind::BulkEnabled
            };
            push_activity(
                model,
                kind,
                format!("All servers {action}"),
                format!("Bulk operation: {action} all servers"),
                now,
            );
        }
        (Mutation::Bulk { disable }, Err(e)) => {
            let verb = if disable { "disable" } else { "enable" };
            commands.push(notify(
                NoticeLevel::Error,
                format!("Failed to {verb} all servers: {e}"),
                now,
            ));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DashboardStats {
    pub total: usize,
    pub enabled: usize,
    pub disabled: usize,
    pub recent_changes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRow {
    pub name: String,
    pub display_name: String,
    pub kind: ServerKind,
    pub kind_label: &'static str,
    pub command: String,
    pub args_summary: String,
    pub env_count: usize,
    pub auto_approve_count: usize,
    pub enabled: bool,
    pub uptime: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityRow {
    pub kind: ActivityKind,
    pub title: String,
    pub description: String,
    pub time_ago: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardView {
    pub status_text: &'static str,
    pub stats: DashboardStats,
    pub rows: Vec<ServerRow>,
    pub empty_hint: Option<String>,
    pub activity: Vec<ActivityRow>,
    pub controls_enabled: bool,
}

fn matches_search(name: &str, shown: &str, search: &str) -> bool {
    let needle = search.to_lowercase();
    needle.is_empty()
        || name.to_lowercase().contains(&needle)
        || shown.to_lowercase().contains(&needle)
}

pub fn view(model: &DashboardModel, now: DateTime<Utc>) -> DashboardView {
    let entries = model
        .document
        .as_ref()
        .map(ConfigDocument::entries)
        .unwrap_or_default();

    let enabled = entries.iter().filter(|(_, e)| e.is_enabled()).count();
    let stats = DashboardStats {
        total: entries.len(),
        enabled,
        disabled: entries.len() - enabled,
        recent_changes: model.activity.len(),
    };

    let rows: Vec<ServerRow> = entries
        .into_iter()
        .filter_map(|(name, entry)| {
            let shown = display_name(&name);
            if !matches_search(&name, &shown, &model.search) || !model.filter.matches(&entry) {
                return None;
            }
            let kind = ServerKind::from_command(&entry.command);
            let uptime = if !entry.is_enabled() {
                "Disabled".to_string()
            } else {
                model
                    .first_seen
                    .get(&name)
                    .map_or_else(|| "Just started".to_string(), |since| format_row_uptime(*since, now))
            };
            Some(ServerRow {
                display_name: shown,
                kind,
                kind_label: kind.label(),
                args_summary: args_summary(&entry.args),
                env_count: entry.env_count(),
                auto_approve_count: entry.auto_approve_count(),
                enabled: entry.is_enabled(),
                command: entry.command,
                uptime,
                name,
            })
        })
        .collect();

    let empty_hint = rows.is_empty().then(|| {
        let filtered = !model.search.is_empty() || model.filter != ServerFilter::All;
        if filtered {
            "Try adjusting your search or filter criteria".to_string()
        } else {
            format!(
                "Check your MCP configuration file at {}",
                model.config_path.as_deref().unwrap_or("~/.aws/amazonq/mcp.json")
            )
        }
    });

    DashboardView {
        status_text: model.status.text(),
        stats,
        rows,
        empty_hint,
        activity: model
            .activity
            .iter()
            .map(|a| ActivityRow {
                kind: a.kind,
                title: a.title.clone(),
                description: a.description.clone(),
                time_ago: format_time_ago(a.at, now),
            })
            .collect(),
        controls_enabled: !model.busy && model.status == ConnectionStatus::Connected,
    }
}

/// Async driver for the dashboard.
pub struct Dashboard<A> {
    api: A,
    model: DashboardModel,
}

impl<A: ManagerApi> Dashboard<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            model: DashboardModel::default(),
        }
    }

    pub fn model(&self) -> &DashboardModel {
        &self.model
    }

    pub fn view(&self, now: DateTime<Utc>) -> DashboardView {
        view(&self.model, now)
    }

    /// Feed one message, run the resulting fetches and writes, and return
    /// the notices produced along the way.
    pub async fn dispatch(&mut self, msg: DashboardMsg) -> Vec<Notice> {
        let mut notices = Vec::new();
        let mut queue = VecDeque::from([msg]);

        while let Some(msg) = queue.pop_front() {
            let (model, commands) = update(std::mem::take(&mut self.model), msg, Utc::now());
            self.model = model;

            for command in commands {
                match command {
                    DashboardCommand::FetchConfig => {
                        queue.push_back(DashboardMsg::Loaded(self.api.get_config().await));
                    }
                    DashboardCommand::WriteConfig(document) => {
                        let result = write_through(&self.api, &document).await;
                        match &result {
                            Ok(path) => tracing::info!(path = %path, "configuration written"),
                            Err(e) => tracing::warn!(error = %e, "configuration write failed"),
                        }
                        queue.push_back(DashboardMsg::WriteFinished(result));
                    }
                    DashboardCommand::Notify(notice) => notices.push(notice),
                }
            }
        }

        notices
    }
}
