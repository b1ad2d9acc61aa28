//! In-process session activity monitor.
//!
//! Records lifecycle events, message counts, and operator alerts per session
//! id, and renders summary/detail reports for the reporting tools.
//!
//! # Consistency
//!
//! The registry map sits behind a `RwLock`; each session aggregate has its
//! own `Mutex`. Mutations to one session are serialized, mutations to
//! different sessions proceed independently. Summaries lock sessions one at
//! a time, so a summary taken while updates are in flight is not an atomic
//! snapshot of the whole registry.

pub mod report;
pub mod types;

pub use report::{render_details, render_missing, render_summary, NO_SESSIONS};
pub use types::{format_alert, SessionEvent, SessionInfo, SessionStatus};

use crate::config::MonitorConfig;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

type SessionCell = Arc<Mutex<SessionInfo>>;

#[derive(Default)]
struct Registry {
    sessions: HashMap<String, SessionCell>,
    /// Insertion order, used for report ordering.
    order: Vec<String>,
}

impl Registry {
    fn evict_least_recent(&mut self) {
        let victim = self
            .order
            .iter()
            .enumerate()
            .filter_map(|(idx, id)| {
                self.sessions
                    .get(id)
                    .map(|cell| (idx, cell.lock().last_event_at))
            })
            .min_by_key(|(_, last)| *last)
            .map(|(idx, _)| idx);

        if let Some(idx) = victim {
            let id = self.order.remove(idx);
            self.sessions.remove(&id);
            tracing::debug!(session_id = %id, "Evicted least recently active session");
        }
    }
}

/// Process-wide session bookkeeping, shared by the chat handler and tools.
pub struct SessionMonitor {
    registry: RwLock<Registry>,
    max_events: usize,
    /// `0` keeps every session for the process lifetime.
    max_sessions: usize,
    detail_events: usize,
}

impl SessionMonitor {
    pub fn new(max_events: usize) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            max_events: max_events.max(1),
            max_sessions: 0,
            detail_events: 10,
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            max_events: config.max_events.max(1),
            max_sessions: config.max_sessions,
            detail_events: config.detail_events,
        }
    }

    /// Bound the registry; the least recently active session is evicted
    /// when a new id would exceed the limit.
    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    pub fn max_events(&self) -> usize {
        self.max_events
    }

    fn get_or_create(&self, session_id: &str, user_id: &str, agent_name: &str) -> SessionCell {
        if let Some(cell) = self.registry.read().sessions.get(session_id) {
            return Arc::clone(cell);
        }

        let mut registry = self.registry.write();
        if let Some(cell) = registry.sessions.get(session_id) {
            return Arc::clone(cell);
        }

        if self.max_sessions > 0 && registry.sessions.len() >= self.max_sessions {
            registry.evict_least_recent();
        }

        let cell = Arc::new(Mutex::new(SessionInfo::new(
            session_id,
            user_id,
            agent_name,
            Utc::now(),
        )));
        registry
            .sessions
            .insert(session_id.to_string(), Arc::clone(&cell));
        registry.order.push(session_id.to_string());
        cell
    }

    fn lookup(&self, session_id: &str) -> Option<SessionCell> {
        self.registry.read().sessions.get(session_id).cloned()
    }

    /// Record a lifecycle event, derive the new status, and queue an alert.
    pub fn log_event(
        &self,
        session_id: &str,
        user_id: &str,
        agent_name: &str,
        event_type: &str,
        detail: Option<&str>,
        error: Option<&str>,
    ) {
        let cell = self.get_or_create(session_id, user_id, agent_name);
        let status = {
            let mut session = cell.lock();
            let timestamp = session.touch(Utc::now());

            let status = SessionStatus::from_event_type(event_type);
            session.status = status;
            if status == SessionStatus::Error {
                session.error_count += 1;
            }

            session.push_event(
                SessionEvent {
                    timestamp,
                    event_type: event_type.to_string(),
                    detail: detail.map(str::to_string),
                    error: error.map(str::to_string),
                },
                self.max_events,
            );
            session
                .alerts
                .push(format_alert(session_id, event_type, detail, error));
            status
        };

        tracing::info!(
            session_id,
            user_id,
            agent_name,
            event_type,
            detail = ?detail,
            error = ?error,
            status = status.as_str(),
            "session_event"
        );
    }

    /// Count one chat message against the session.
    pub fn record_message(&self, session_id: &str, user_id: &str, agent_name: &str) {
        let cell = self.get_or_create(session_id, user_id, agent_name);
        let mut session = cell.lock();
        session.message_count += 1;
        session.touch(Utc::now());
    }

    /// Drain and return pending alerts; unknown ids yield an empty list.
    pub fn pop_alerts(&self, session_id: &str) -> Vec<String> {
        self.lookup(session_id)
            .map(|cell| std::mem::take(&mut cell.lock().alerts))
            .unwrap_or_default()
    }

    /// Clone of one session's current state.
    pub fn session(&self, session_id: &str) -> Option<SessionInfo> {
        self.lookup(session_id).map(|cell| cell.lock().clone())
    }

    /// Clones of every session in insertion order.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let cells: Vec<SessionCell> = {
            let registry = self.registry.read();
            registry
                .order
                .iter()
                .filter_map(|id| registry.sessions.get(id).cloned())
                .collect()
        };
        cells.iter().map(|cell| cell.lock().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.registry.read().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One line per known session, or [`NO_SESSIONS`].
    pub fn get_summary(&self) -> String {
        render_summary(&self.sessions(), Utc::now())
    }

    /// Detail block for one session, or a "not found" sentinel naming the id.
    pub fn get_details(&self, session_id: &str) -> String {
        match self.session(session_id) {
            Some(info) => render_details(&info, self.detail_events),
            None => render_missing(session_id),
        }
    }
}

impl Default for SessionMonitor {
    fn default() -> Self {
        Self::from_config(&MonitorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> SessionMonitor {
        SessionMonitor::new(5)
    }

    #[test]
    fn first_event_creates_session_without_messages() {
        let m = monitor();
        m.log_event("s1", "u1", "agent", "message_received", None, None);
        assert_eq!(m.len(), 1);
        let info = m.session("s1").unwrap();
        assert_eq!(info.message_count, 0);
        assert_eq!(info.status, SessionStatus::Active);
        assert_eq!(info.events.len(), 1);
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn session_event_log_keeps_absent_fields_distinct() {
        let logs = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_writer(logs.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            let m = monitor();
            m.log_event("s1", "u1", "agent", "message_received", None, None);
            m.log_event("s1", "u1", "agent", "note", Some(""), None);
        });

        let text = String::from_utf8(logs.0.lock().clone()).unwrap();
        let lines: Vec<&str> = text.lines().filter(|l| l.contains("session_event")).collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("detail=None"));
        assert!(lines[0].contains("error=None"));
        assert!(lines[1].contains("detail=Some(\"\")"));
    }

    #[test]
    fn padded_error_type_is_not_counted() {
        let m = monitor();
        m.log_event("s1", "u1", "agent", " error ", None, Some("boom"));
        let info = m.session("s1").unwrap();
        assert_eq!(info.status, SessionStatus::Active);
        assert_eq!(info.error_count, 0);
        assert_eq!(info.events[0].event_type, " error ");
    }

    #[test]
    fn log_event_and_summary() {
        let m = monitor();
        m.log_event("s1", "u1", "agent", "created", Some("created session"), None);
        m.record_message("s1", "u1", "agent");
        m.log_event("s1", "u1", "agent", "completed", Some("done"), None);

        let summary = m.get_summary();
        assert!(summary.contains("s1"));
        assert!(summary.contains("messages=1"));
        assert!(summary.contains("status=completed"));
    }

    #[test]
    fn end_to_end_message_count_only_moves_on_record_message() {
        let m = monitor();
        m.log_event("s1", "u1", "agentX", "message_received", None, None);
        m.log_event("s1", "u1", "agentX", "completed", Some("done"), None);
        let summary = m.get_summary();
        assert!(summary.contains("status=completed"));
        assert!(summary.contains("messages=0"));
    }

    #[test]
    fn events_are_capped_to_most_recent() {
        let m = monitor();
        for i in 0..12 {
            m.log_event("s1", "u1", "agent", &format!("step{i}"), None, None);
            assert!(m.session("s1").unwrap().events.len() <= m.max_events());
        }
        let kinds: Vec<String> = m
            .session("s1")
            .unwrap()
            .events
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(kinds, vec!["step7", "step8", "step9", "step10", "step11"]);
    }

    #[test]
    fn error_events_count_once_per_call() {
        let m = monitor();
        m.log_event("s2", "u2", "agent", "error", None, Some("boom"));
        m.log_event("s2", "u2", "agent", "FAILED", None, None);
        let info = m.session("s2").unwrap();
        assert_eq!(info.status, SessionStatus::Error);
        assert_eq!(info.error_count, 2);
    }

    #[test]
    fn error_status_is_not_sticky() {
        let m = monitor();
        m.log_event("s2", "u2", "agent", "error", None, Some("boom"));
        m.log_event("s2", "u2", "agent", "active", Some("recovered"), None);
        let info = m.session("s2").unwrap();
        assert_eq!(info.status, SessionStatus::Active);
        assert_eq!(info.error_count, 1);
    }

    #[test]
    fn details_and_alerts() {
        let m = monitor();
        m.log_event("s2", "u2", "agent", "error", None, Some("boom"));
        m.log_event("s2", "u2", "agent", "active", Some("recovered"), None);

        let details = m.get_details("s2");
        assert!(details.contains("boom"));
        assert!(details.contains("recovered"));

        let alerts = m.pop_alerts("s2");
        assert_eq!(
            alerts,
            vec![
                "Session s2: error | error=boom".to_string(),
                "Session s2: active | recovered".to_string(),
            ]
        );
        assert!(m.pop_alerts("s2").is_empty());
    }

    #[test]
    fn record_message_leaves_events_and_alerts_alone() {
        let m = monitor();
        m.record_message("s3", "u3", "agent");
        let info = m.session("s3").unwrap();
        assert_eq!(info.message_count, 1);
        assert_eq!(info.status, SessionStatus::Created);
        assert!(info.events.is_empty());
        assert!(m.pop_alerts("s3").is_empty());
    }

    #[test]
    fn unknown_session_lookups_degrade() {
        let m = monitor();
        assert!(m.pop_alerts("missing").is_empty());
        let details = m.get_details("missing");
        assert!(details.contains("No session found"));
        assert!(details.contains("missing"));
        assert_eq!(m.get_summary(), NO_SESSIONS);
    }

    #[test]
    fn first_reference_fixes_user_and_agent() {
        let m = monitor();
        m.record_message("s4", "alice", "agent-a");
        m.log_event("s4", "bob", "agent-b", "message_received", None, None);
        let info = m.session("s4").unwrap();
        assert_eq!(info.user_id, "alice");
        assert_eq!(info.agent_name, "agent-a");
    }

    #[test]
    fn summary_keeps_insertion_order() {
        let m = monitor();
        m.log_event("b", "u", "a", "x", None, None);
        m.log_event("a", "u", "a", "x", None, None);
        m.log_event("c", "u", "a", "x", None, None);
        let ids: Vec<String> = m.sessions().into_iter().map(|s| s.session_id).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn bounded_registry_evicts_least_recent() {
        let m = SessionMonitor::new(5).with_max_sessions(2);
        m.log_event("old", "u", "a", "x", None, None);
        std::thread::sleep(std::time::Duration::from_millis(5));
        m.log_event("mid", "u", "a", "x", None, None);
        std::thread::sleep(std::time::Duration::from_millis(5));
        m.log_event("old", "u", "a", "y", None, None);
        std::thread::sleep(std::time::Duration::from_millis(5));
        m.log_event("new", "u", "a", "x", None, None);

        assert_eq!(m.len(), 2);
        assert!(m.session("mid").is_none());
        assert!(m.session("old").is_some());
        assert!(m.session("new").is_some());
    }

    #[test]
    fn concurrent_updates_to_one_session_are_not_lost() {
        let m = Arc::new(SessionMonitor::new(1000));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = Arc::clone(&m);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        m.record_message("shared", "u", "a");
                        m.log_event("shared", "u", "a", "error", None, None);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let info = m.session("shared").unwrap();
        assert_eq!(info.message_count, 400);
        assert_eq!(info.error_count, 400);
        assert_eq!(m.pop_alerts("shared").len(), 400);
    }
}
