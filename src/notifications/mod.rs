//! Notification collaborator: fire-and-forget user-facing messages.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

pub mod sinks;

pub use sinks::{BroadcastNotifier, TracingNotifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single toast as delivered to whatever renders notifications.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
}

/// Implementations must never block and never panic; failures to deliver are
/// swallowed.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, severity: Severity);
}
