//! Client Lifecycle Controller — tracks whether the service is reachable.
//!
//! The controller believes the service is in one of five states, derived
//! solely from health probes:
//!
//! - `Unknown` until the first probe is issued
//! - `Checking` while the initial probe or a start poll is outstanding
//! - `Online` / `Offline` from the latest probe
//! - `ShuttingDown` between a stop request and its acknowledgement
//!
//! Start and stop are bounded polling loops. Start polls health every second
//! for up to 30 attempts. Stop sends a shutdown and then watches for a restart
//! every 5 seconds for up to 60 attempts. Exhausting the restart watch leaves
//! the controller `Offline` with periodic probing suspended until the next
//! manual action. Only one transition runs at a time; periodic probes are
//! skipped while one is active and stale probe results are dropped.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::client::api::{ClientError, ManagerApi};
use crate::client::{Notice, NoticeLevel};
use crate::service::responses::HealthResponse;

/// Polling cadence and ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleTiming {
    /// Background health probe period.
    pub probe_interval: Duration,
    pub start_poll_interval: Duration,
    pub start_max_attempts: u32,
    pub restart_poll_interval: Duration,
    pub restart_max_attempts: u32,
}

impl Default for LifecycleTiming {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(10),
            start_poll_interval: Duration::from_secs(1),
            start_max_attempts: 30,
            restart_poll_interval: Duration::from_secs(5),
            restart_max_attempts: 60,
        }
    }
}

/// The controller's belief about the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Unknown,
    Checking,
    Online,
    Offline,
    ShuttingDown,
}

/// Why a health probe was issued. Results are matched back against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    Initial,
    Periodic,
    Manual,
    Start { attempt: u32 },
    RestartWatch { attempt: u32 },
}

/// A user-initiated transition in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Starting { attempt: u32 },
    Stopping,
    WatchingRestart { attempt: u32 },
}

/// Operator actions accepted by the running controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    Start,
    Stop,
    Refresh,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleMsg {
    Opened,
    ProbeTick,
    StartRequested,
    StopRequested,
    RefreshRequested,
    HealthChecked {
        kind: ProbeKind,
        outcome: Result<HealthResponse, ClientError>,
    },
    ShutdownFinished(Result<(), ClientError>),
    PollDue(ProbeKind),
    Teardown,
}

impl From<UserAction> for LifecycleMsg {
    fn from(action: UserAction) -> Self {
        match action {
            UserAction::Start => LifecycleMsg::StartRequested,
            UserAction::Stop => LifecycleMsg::StopRequested,
            UserAction::Refresh => LifecycleMsg::RefreshRequested,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleCommand {
    ProbeHealth(ProbeKind),
    SendShutdown,
    SchedulePoll { kind: ProbeKind, after: Duration },
    Notify(Notice),
    /// The service is reachable again; reload any data derived from it.
    Reload,
    /// Periodic probing lost a service that was online.
    WentOffline,
    /// A requested shutdown was acknowledged.
    Stopped,
    /// The restart watch found the service again.
    Restarted,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LifecycleModel {
    pub state: LifecycleState,
    pub transition: Option<Transition>,
    /// Whether background probes are issued. Suspended after a stop.
    pub periodic_armed: bool,
    pub torn_down: bool,
    /// Service start time, derived from the reported uptime.
    pub server_started_at: Option<DateTime<Utc>>,
    pub port: Option<u16>,
    pub config_path: Option<String>,
    pub description: String,
    pub timing: LifecycleTiming,
}

impl LifecycleModel {
    pub fn new(timing: LifecycleTiming) -> Self {
        Self {
            periodic_armed: true,
            timing,
            ..Default::default()
        }
    }
}

/// Apply one message. Pure: all effects are returned as commands.
pub fn update(
    mut model: LifecycleModel,
    msg: LifecycleMsg,
    now: DateTime<Utc>,
) -> (LifecycleModel, Vec<LifecycleCommand>) {
    let mut commands = Vec::new();
    if model.torn_down {
        return (model, commands);
    }

    match msg {
        LifecycleMsg::Opened => {
            if model.state == LifecycleState::Unknown {
                model.state = LifecycleState::Checking;
                model.description = "Checking server status".to_string();
                commands.push(LifecycleCommand::ProbeHealth(ProbeKind::Initial));
            }
        }
        LifecycleMsg::ProbeTick => {
            if model.periodic_armed
                && model.transition.is_none()
                && model.state != LifecycleState::Checking
            {
                commands.push(LifecycleCommand::ProbeHealth(ProbeKind::Periodic));
            }
        }
        LifecycleMsg::StartRequested => {
            if model.transition.is_none()
                && matches!(
                    model.state,
                    LifecycleState::Offline | LifecycleState::Unknown
                )
            {
                model.periodic_armed = true;
                model.state = LifecycleState::Checking;
                model.transition = Some(Transition::Starting { attempt: 1 });
                model.description = "Waiting for the server to respond".to_string();
                commands.push(LifecycleCommand::ProbeHealth(ProbeKind::Start {
                    attempt: 1,
                }));
            }
        }
        LifecycleMsg::StopRequested => {
            if model.transition.is_none() && model.state == LifecycleState::Online {
                model.state = LifecycleState::ShuttingDown;
                model.transition = Some(Transition::Stopping);
                model.periodic_armed = false;
                model.description = "Gracefully shutting down".to_string();
                commands.push(LifecycleCommand::SendShutdown);
            }
        }
        LifecycleMsg::RefreshRequested => {
            if model.transition.is_none() && model.state != LifecycleState::Checking {
                model.periodic_armed = true;
                commands.push(LifecycleCommand::ProbeHealth(ProbeKind::Manual));
            }
        }
        LifecycleMsg::HealthChecked { kind, outcome } => {
            apply_probe(&mut model, kind, outcome, now, &mut commands);
        }
        LifecycleMsg::ShutdownFinished(result) => {
            if model.transition == Some(Transition::Stopping) {
                match result {
                    Ok(()) => {
                        begin_restart_watch(&mut model, now, "Server stopped successfully", &mut commands)
                    }
                    Err(e) if e.is_unreachable() => {
                        begin_restart_watch(&mut model, now, "Server stopped", &mut commands)
                    }
                    Err(e) => {
                        model.state = LifecycleState::Online;
                        model.transition = None;
                        model.periodic_armed = true;
                        model.description = "Server is running and healthy".to_string();
                        commands.push(notify(
                            NoticeLevel::Error,
                            format!("Failed to stop server: {e}"),
                            now,
                        ));
                    }
                }
            }
        }
        LifecycleMsg::PollDue(kind) => {
            let expected = match model.transition {
                Some(Transition::Starting { attempt }) => Some(ProbeKind::Start { attempt }),
                Some(Transition::WatchingRestart { attempt }) => {
                    Some(ProbeKind::RestartWatch { attempt })
                }
                _ => None,
            };
            if expected == Some(kind) {
                commands.push(LifecycleCommand::ProbeHealth(kind));
            }
        }
        LifecycleMsg::Teardown => {
            model.torn_down = true;
            model.periodic_armed = false;
            model.transition = None;
        }
    }

    (model, commands)
}

fn notify(level: NoticeLevel, message: impl Into<String>, now: DateTime<Utc>) -> LifecycleCommand {
    LifecycleCommand::Notify(Notice::new(level, message, now))
}

fn go_online(model: &mut LifecycleModel, health: &HealthResponse, now: DateTime<Utc>, description: &str) {
    let uptime_ms = (health.uptime.max(0.0) * 1000.0) as i64;
    let uptime = TimeDelta::try_milliseconds(uptime_ms).unwrap_or_else(TimeDelta::zero);
    model.state = LifecycleState::Online;
    model.server_started_at = Some(now.checked_sub_signed(uptime).unwrap_or(now));
    model.port = Some(health.port);
    model.config_path = Some(health.config_path.clone());
    model.description = description.to_string();
}

fn go_offline(model: &mut LifecycleModel, description: &str) {
    model.state = LifecycleState::Offline;
    model.server_started_at = None;
    model.description = description.to_string();
}

fn begin_restart_watch(
    model: &mut LifecycleModel,
    now: DateTime<Utc>,
    message: &str,
    commands: &mut Vec<LifecycleCommand>,
) {
    go_offline(model, "Server stopped gracefully");
    model.transition = Some(Transition::WatchingRestart { attempt: 1 });
    commands.push(notify(NoticeLevel::Success, message, now));
    commands.push(LifecycleCommand::Stopped);
    commands.push(LifecycleCommand::SchedulePoll {
        kind: ProbeKind::RestartWatch { attempt: 1 },
        after: model.timing.restart_poll_interval,
    });
}

fn apply_probe(
    model: &mut LifecycleModel,
    kind: ProbeKind,
    outcome: Result<HealthResponse, ClientError>,
    now: DateTime<Utc>,
    commands: &mut Vec<LifecycleCommand>,
) {
    match kind {
        ProbeKind::Initial => {
            if model.state != LifecycleState::Checking || model.transition.is_some() {
                return;
            }
            match outcome {
                Ok(health) => {
                    go_online(model, &health, now, "Server is running and healthy");
                    commands.push(LifecycleCommand::Reload);
                }
                Err(_) => {
                    go_offline(model, "Server is offline");
                    commands.push(notify(
                        NoticeLevel::Error,
                        "Backend server not running. Start it with: mcp-manager serve",
                        now,
                    ));
                }
            }
        }
        ProbeKind::Periodic | ProbeKind::Manual => {
            if model.transition.is_some() {
                return;
            }
            let was_online = model.state == LifecycleState::Online;
            match outcome {
                Ok(health) => {
                    go_online(model, &health, now, "Server is running and healthy");
                    if !was_online {
                        commands.push(notify(NoticeLevel::Success, "Server came back online", now));
                        commands.push(LifecycleCommand::Reload);
                    }
                }
                Err(_) => {
                    if was_online {
                        commands.push(notify(NoticeLevel::Warning, "Server went offline", now));
                        commands.push(LifecycleCommand::WentOffline);
                    }
                    go_offline(model, "Server is offline");
                }
            }
        }
        ProbeKind::Start { attempt } => {
            if model.transition != Some(Transition::Starting { attempt }) {
                return;
            }
            match outcome {
                Ok(health) => {
                    model.transition = None;
                    go_online(model, &health, now, "Server started successfully");
                    commands.push(notify(NoticeLevel::Success, "Server started successfully!", now));
                    commands.push(LifecycleCommand::Reload);
                }
                Err(_) if attempt < model.timing.start_max_attempts => {
                    let next = attempt + 1;
                    model.transition = Some(Transition::Starting { attempt: next });
                    commands.push(LifecycleCommand::SchedulePoll {
                        kind: ProbeKind::Start { attempt: next },
                        after: model.timing.start_poll_interval,
                    });
                }
                Err(_) => {
                    model.transition = None;
                    go_offline(model, "Failed to start server");
                    commands.push(notify(
                        NoticeLevel::Error,
                        "Failed to start server: Server failed to start within timeout period",
                        now,
                    ));
                }
            }
        }
        ProbeKind::RestartWatch { attempt } => {
            if model.transition != Some(Transition::WatchingRestart { attempt }) {
                return;
            }
            match outcome {
                Ok(health) => {
                    model.transition = None;
                    model.periodic_armed = true;
                    go_online(model, &health, now, "Server restarted");
                    commands.push(notify(
                        NoticeLevel::Success,
                        "Server is back online! Dashboard reloaded.",
                        now,
                    ));
                    commands.push(LifecycleCommand::Restarted);
                    commands.push(LifecycleCommand::Reload);
                }
                Err(_) if attempt < model.timing.restart_max_attempts => {
                    let next = attempt + 1;
                    model.transition = Some(Transition::WatchingRestart { attempt: next });
                    commands.push(LifecycleCommand::SchedulePoll {
                        kind: ProbeKind::RestartWatch { attempt: next },
                        after: model.timing.restart_poll_interval,
                    });
                }
                Err(_) => {
                    model.transition = None;
                    go_offline(model, "Server is offline; refresh to check again");
                    commands.push(notify(
                        NoticeLevel::Info,
                        "Stopped watching for a restart. Refresh to check again.",
                        now,
                    ));
                }
            }
        }
    }
}

/// Render-ready projection of the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleView {
    pub state: LifecycleState,
    pub status_text: &'static str,
    pub description: String,
    pub uptime: String,
    pub busy: bool,
    pub start_enabled: bool,
    pub stop_enabled: bool,
    pub dashboard_enabled: bool,
}

pub fn view(model: &LifecycleModel, now: DateTime<Utc>) -> LifecycleView {
    let busy = model.transition.is_some();
    let online = model.state == LifecycleState::Online;
    let status_text = match model.state {
        LifecycleState::Unknown => "Unknown",
        LifecycleState::Checking => "Checking...",
        LifecycleState::Online => "Server Online",
        LifecycleState::Offline => "Server Offline",
        LifecycleState::ShuttingDown => "Shutting down...",
    };
    let uptime = match (online, model.server_started_at) {
        (true, Some(started)) => format_uptime(now - started),
        (true, None) => "Unknown".to_string(),
        (false, _) => "Not running".to_string(),
    };

    LifecycleView {
        state: model.state,
        status_text,
        description: model.description.clone(),
        uptime,
        busy,
        start_enabled: !busy && matches!(model.state, LifecycleState::Offline | LifecycleState::Unknown),
        stop_enabled: !busy && online,
        dashboard_enabled: online,
    }
}

/// `3d 4h 5m`, `4h 5m 6s`, `5m 6s`, or `6s`.
pub fn format_uptime(elapsed: TimeDelta) -> String {
    let seconds = elapsed.num_seconds().max(0);
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("{}d {}h {}m", days, hours % 24, minutes % 60)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, minutes % 60, seconds % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{seconds}s")
    }
}

/// Output of the running controller.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Notice(Notice),
    Reload,
    WentOffline,
    Stopped,
    Restarted,
    Render(LifecycleView),
}

/// Async driver: executes commands against a `ManagerApi`.
pub struct LifecycleController<A> {
    api: A,
    model: LifecycleModel,
    pending_poll: Option<(Instant, ProbeKind)>,
}

impl<A: ManagerApi> LifecycleController<A> {
    pub fn new(api: A, timing: LifecycleTiming) -> Self {
        Self {
            api,
            model: LifecycleModel::new(timing),
            pending_poll: None,
        }
    }

    pub fn model(&self) -> &LifecycleModel {
        &self.model
    }

    pub fn view(&self, now: DateTime<Utc>) -> LifecycleView {
        view(&self.model, now)
    }

    /// Whether a bounded poll is scheduled.
    pub fn has_pending_poll(&self) -> bool {
        self.pending_poll.is_some()
    }

    /// Feed one message and run every resulting command to completion.
    ///
    /// Probes and shutdown requests are awaited inline, so their results are
    /// applied before this returns. Scheduled polls are only recorded; see
    /// [`Self::wait_for_poll`].
    pub async fn dispatch(&mut self, msg: LifecycleMsg) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();
        let mut queue = VecDeque::from([msg]);

        while let Some(msg) = queue.pop_front() {
            let before = self.model.state;
            let (model, commands) = update(std::mem::take(&mut self.model), msg, Utc::now());
            self.model = model;

            for command in commands {
                match command {
                    LifecycleCommand::ProbeHealth(kind) => {
                        let outcome = self.api.health().await;
                        if let Err(e) = &outcome {
                            tracing::debug!(?kind, error = %e, "health probe failed");
                        }
                        queue.push_back(LifecycleMsg::HealthChecked { kind, outcome });
                    }
                    LifecycleCommand::SendShutdown => {
                        let result = self.api.shutdown().await.map(|_| ());
                        queue.push_back(LifecycleMsg::ShutdownFinished(result));
                    }
                    LifecycleCommand::SchedulePoll { kind, after } => {
                        self.pending_poll = Some((Instant::now() + after, kind));
                    }
                    LifecycleCommand::Notify(notice) => events.push(LifecycleEvent::Notice(notice)),
                    LifecycleCommand::Reload => events.push(LifecycleEvent::Reload),
                    LifecycleCommand::WentOffline => events.push(LifecycleEvent::WentOffline),
                    LifecycleCommand::Stopped => events.push(LifecycleEvent::Stopped),
                    LifecycleCommand::Restarted => events.push(LifecycleEvent::Restarted),
                }
            }

            if self.model.state != before {
                tracing::info!(from = ?before, to = ?self.model.state, "lifecycle state changed");
                events.push(LifecycleEvent::Render(self.view(Utc::now())));
            }
        }

        if self.model.transition.is_none() {
            self.pending_poll = None;
        }
        events
    }

    /// Sleep until the scheduled poll is due and return its probe kind.
    ///
    /// `None` immediately when nothing is scheduled.
    pub async fn wait_for_poll(&mut self) -> Option<ProbeKind> {
        let (due, kind) = self.pending_poll.take()?;
        tokio::time::sleep_until(due).await;
        Some(kind)
    }

    /// Run until cancelled or the action channel closes.
    ///
    /// Probes on open, then multiplexes operator actions, the periodic probe,
    /// scheduled polls, and a one-second render tick for the uptime display.
    pub async fn run(
        mut self,
        mut actions: mpsc::Receiver<UserAction>,
        events: mpsc::UnboundedSender<LifecycleEvent>,
        cancel: CancellationToken,
    ) -> LifecycleModel {
        let probe_every = self.model.timing.probe_interval;
        let mut probe = tokio::time::interval_at(Instant::now() + probe_every, probe_every);
        probe.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut render = tokio::time::interval_at(
            Instant::now() + Duration::from_secs(1),
            Duration::from_secs(1),
        );
        render.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let emit = |batch: Vec<LifecycleEvent>| {
            for event in batch {
                // A closed receiver just means nobody is rendering any more.
                let _ = events.send(event);
            }
        };

        emit(self.dispatch(LifecycleMsg::Opened).await);

        loop {
            let poll_due = self.pending_poll.map(|(due, _)| due);
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("lifecycle controller cancelled");
                    break;
                }
                action = actions.recv() => match action {
                    Some(action) => emit(self.dispatch(action.into()).await),
                    None => break,
                },
                _ = probe.tick() => emit(self.dispatch(LifecycleMsg::ProbeTick).await),
                _ = render.tick() => {
                    if self.model.state == LifecycleState::Online {
                        emit(vec![LifecycleEvent::Render(self.view(Utc::now()))]);
                    }
                }
                _ = sleep_until_some(poll_due) => {
                    if let Some(kind) = self.pending_poll.take().map(|(_, kind)| kind) {
                        emit(self.dispatch(LifecycleMsg::PollDue(kind)).await);
                    }
                }
            }
        }

        self.dispatch(LifecycleMsg::Teardown).await;
        self.model
    }
}

async fn sleep_until_some(due: Option<Instant>) {
    match due {
        Some(due) => tokio::time::sleep_until(due).await,
        None => std::future::pending().await,
    }
}
