//! Operator-facing text renderings of monitor state.

use chrono::{DateTime, Local, Utc};
use std::fmt::Write;

use super::types::SessionInfo;

/// Returned by the summary when nothing has been recorded yet.
pub const NO_SESSIONS: &str = "No sessions recorded.";

/// Render a timestamp the way `ctime(3)` does, in local time.
pub fn ctime(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local)
        .format("%a %b %e %H:%M:%S %Y")
        .to_string()
}

fn whole_seconds_between(earlier: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - earlier).num_seconds().max(0)
}

/// One line per session, in the order given.
pub fn render_summary(sessions: &[SessionInfo], now: DateTime<Utc>) -> String {
    if sessions.is_empty() {
        return NO_SESSIONS.to_string();
    }

    sessions
        .iter()
        .map(|info| {
            format!(
                "- {} (user={}, agent={}): status={}, messages={}, errors={}, age={}s, last_event={}s ago",
                info.session_id,
                info.user_id,
                info.agent_name,
                info.status,
                info.message_count,
                info.error_count,
                whole_seconds_between(info.created_at, now),
                whole_seconds_between(info.last_event_at, now),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Sentinel for an unknown session id.
pub fn render_missing(session_id: &str) -> String {
    format!("No session found for id {session_id}.")
}

/// Multi-line block for one session with its `recent` most recent events.
pub fn render_details(info: &SessionInfo, recent: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Session {} (user={}, agent={})",
        info.session_id, info.user_id, info.agent_name
    );
    let _ = writeln!(out, "Status: {}", info.status);
    let _ = writeln!(
        out,
        "Messages: {}, Errors: {}",
        info.message_count, info.error_count
    );
    let _ = writeln!(out, "Created: {}", ctime(info.created_at));
    let _ = writeln!(out, "Last event: {}", ctime(info.last_event_at));
    out.push_str("Recent events:");

    let start = info.events.len().saturating_sub(recent);
    for event in &info.events[start..] {
        let _ = write!(out, "\n  - {} | {}", ctime(event.timestamp), event.event_type);
        if let Some(detail) = event.detail.as_deref().filter(|d| !d.is_empty()) {
            let _ = write!(out, " | {detail}");
        }
        if let Some(error) = event.error.as_deref().filter(|e| !e.is_empty()) {
            let _ = write!(out, " | error={error}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::types::{SessionEvent, SessionStatus};

    fn sample(now: DateTime<Utc>) -> SessionInfo {
        let mut info = SessionInfo::new("s1", "u1", "agentX", now - chrono::Duration::seconds(42));
        info.last_event_at = now - chrono::Duration::seconds(5);
        info.status = SessionStatus::Completed;
        info.message_count = 2;
        info.error_count = 1;
        info
    }

    #[test]
    fn empty_summary_is_sentinel() {
        assert_eq!(render_summary(&[], Utc::now()), NO_SESSIONS);
    }

    #[test]
    fn summary_line_contains_all_fields() {
        let now = Utc::now();
        let line = render_summary(&[sample(now)], now);
        assert_eq!(
            line,
            "- s1 (user=u1, agent=agentX): status=completed, messages=2, errors=1, age=42s, last_event=5s ago"
        );
    }

    #[test]
    fn details_limits_to_recent_events() {
        let now = Utc::now();
        let mut info = sample(now);
        for i in 0..15 {
            info.events.push(SessionEvent {
                timestamp: now,
                event_type: format!("step{i}"),
                detail: (i % 2 == 0).then(|| format!("d{i}")),
                error: (i == 14).then(|| "boom".to_string()),
            });
        }
        let text = render_details(&info, 10);
        assert!(text.starts_with("Session s1 (user=u1, agent=agentX)\nStatus: completed\n"));
        assert!(text.contains("Messages: 2, Errors: 1"));
        assert!(!text.contains("| step4 |"));
        assert!(text.contains("| step5"));
        assert!(text.contains("| step14 | d14 | error=boom"));
        assert_eq!(text.matches("\n  - ").count(), 10);
    }

    #[test]
    fn missing_sentinel_names_the_id() {
        let text = render_missing("abc");
        assert!(text.contains("abc"));
        assert!(text.contains("No session found"));
    }
}
