//! Client-side controllers that drive the Config Service over HTTP.
//!
//! Both controllers follow the same shape: an explicit model record, a pure
//! `update(model, msg, now)` reducer returning commands, a `view(model, now)`
//! projection, and a small async driver that executes commands through a
//! [`ManagerApi`] and feeds the results back in as messages.

pub mod api;
pub mod dashboard;
pub mod lifecycle;

#[cfg(test)]
pub(crate) mod testing;

use chrono::{DateTime, Utc};

pub use api::{ClientError, HttpApi, LoadedConfig, ManagerApi};

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

impl NoticeLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeLevel::Success => "success",
            NoticeLevel::Info => "info",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        }
    }
}

/// A message for the operator. Rendering (toast, terminal line) is up to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            level,
            message: message.into(),
            at,
        }
    }
}

/// Relative time for activity entries: `Xh ago`, `Xm ago`, or `Just now`.
pub fn format_time_ago(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - at).num_minutes().max(0);
    let hours = minutes / 60;
    if hours > 0 {
        format!("{hours}h ago")
    } else if minutes > 0 {
        format!("{minutes}m ago")
    } else {
        "Just now".to_string()
    }
}
