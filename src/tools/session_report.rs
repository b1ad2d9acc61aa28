use super::traits::{required_str, Tool, ToolResult};
use crate::monitor::SessionMonitor;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

/// Summary of every session the monitor knows about.
pub struct SessionSummaryTool {
    monitor: Arc<SessionMonitor>,
}

impl SessionSummaryTool {
    pub fn new(monitor: Arc<SessionMonitor>) -> Self {
        Self { monitor }
    }
}

#[async_trait]
impl Tool for SessionSummaryTool {
    fn name(&self) -> &str {
        "get_session_summary"
    }

    fn description(&self) -> &str {
        "Return a summary of known chat sessions: status, message and error counts, age, \
         and time since the last event."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "scope": {
                    "type": "string",
                    "description": "Which sessions to include. Currently every known session is reported.",
                    "default": "active"
                }
            }
        })
    }

    async fn execute(&self, _args: serde_json::Value) -> anyhow::Result<ToolResult> {
        Ok(ToolResult::success(self.monitor.get_summary()))
    }
}

/// Detailed view of one session, including its most recent events.
pub struct SessionDetailsTool {
    monitor: Arc<SessionMonitor>,
}

impl SessionDetailsTool {
    pub fn new(monitor: Arc<SessionMonitor>) -> Self {
        Self { monitor }
    }
}

#[async_trait]
impl Tool for SessionDetailsTool {
    fn name(&self) -> &str {
        "get_session_details"
    }

    fn description(&self) -> &str {
        "Return details for a specific chat session, including its recent events."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "The session id to inspect."
                }
            },
            "required": ["session_id"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let Some(session_id) = required_str(&args, "session_id") else {
            return Ok(ToolResult::error("Missing 'session_id' parameter"));
        };
        Ok(ToolResult::success(self.monitor.get_details(session_id)))
    }
}
