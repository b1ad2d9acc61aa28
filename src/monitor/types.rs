//! Session monitor records: events, per-session aggregates, and status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse lifecycle status of a monitored session.
///
/// Derived from the most recently logged event only; an `Error` session
/// returns to `Active` as soon as a non-terminal event arrives.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Initial value before any event has been classified.
    #[default]
    Created,
    Active,
    Completed,
    Error,
}

impl SessionStatus {
    /// Classify a free-form event type (case-insensitive).
    ///
    /// `"created"` is never produced here: an event literally named
    /// `created` classifies as `Active`.
    pub fn from_event_type(event_type: &str) -> Self {
        let normalized = event_type.to_ascii_lowercase();
        match normalized.as_str() {
            "error" | "failed" => Self::Error,
            "completed" | "ended" | "finished" => Self::Completed,
            _ => Self::Active,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single timestamped occurrence recorded against a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub detail: Option<String>,
    pub error: Option<String>,
}

impl SessionEvent {
    /// Seconds since the Unix epoch, with sub-second precision.
    pub fn epoch_seconds(&self) -> f64 {
        self.timestamp.timestamp_millis() as f64 / 1000.0
    }
}

/// Mutable aggregate for one session id.
///
/// `user_id` and `agent_name` are fixed by the first call that references
/// the session; later calls with different values do not overwrite them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub user_id: String,
    pub agent_name: String,
    pub created_at: DateTime<Utc>,
    pub last_event_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub message_count: u64,
    pub error_count: u64,
    /// Newest last, never longer than the monitor's `max_events`.
    pub events: Vec<SessionEvent>,
    /// Pending operator alerts; cleared by `SessionMonitor::pop_alerts`.
    pub alerts: Vec<String>,
}

impl SessionInfo {
    pub(crate) fn new(session_id: &str, user_id: &str, agent_name: &str, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            agent_name: agent_name.to_string(),
            created_at: now,
            last_event_at: now,
            status: SessionStatus::Created,
            message_count: 0,
            error_count: 0,
            events: Vec::new(),
            alerts: Vec::new(),
        }
    }

    /// Advance `last_event_at`, never moving it backwards on clock skew.
    pub(crate) fn touch(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        if now > self.last_event_at {
            self.last_event_at = now;
        }
        self.last_event_at
    }

    /// Append an event, dropping the oldest entries beyond `max_events`.
    pub(crate) fn push_event(&mut self, event: SessionEvent, max_events: usize) {
        self.events.push(event);
        if self.events.len() > max_events {
            let overflow = self.events.len() - max_events;
            self.events.drain(..overflow);
        }
    }
}

/// Build the single-line alert text for an event.
///
/// Empty `detail`/`error` strings are treated as absent.
pub fn format_alert(
    session_id: &str,
    event_type: &str,
    detail: Option<&str>,
    error: Option<&str>,
) -> String {
    let mut alert = format!("Session {session_id}: {event_type}");
    if let Some(detail) = detail.filter(|d| !d.is_empty()) {
        alert.push_str(" | ");
        alert.push_str(detail);
    }
    if let Some(error) = error.filter(|e| !e.is_empty()) {
        alert.push_str(" | error=");
        alert.push_str(error);
    }
    alert
}
