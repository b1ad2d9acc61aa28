//! `ask_devops`: hands a request to the DevOps sub-agent and returns its answer.

use super::traits::{optional_str, required_str, Tool, ToolResult};
use crate::agent::{AgentInput, AgentRunner, NoopObserver};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub const TIMEOUT_MESSAGE: &str = "DevOps agent timed out while processing the request.";

pub struct DelegateTool {
    agent: Arc<dyn AgentRunner>,
    timeout: Duration,
    default_user_id: String,
    test_mode: bool,
}

impl DelegateTool {
    pub fn new(agent: Arc<dyn AgentRunner>, timeout: Duration, default_user_id: &str) -> Self {
        Self {
            agent,
            timeout,
            default_user_id: default_user_id.to_string(),
            test_mode: false,
        }
    }

    /// Answer `[devops-test-mode] {request}` without running the sub-agent.
    #[must_use]
    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    /// Delegation session id; stable per user when none is given.
    pub fn session_for(session_id: Option<&str>, user_id: &str) -> String {
        session_id.map_or_else(|| format!("delegation_{user_id}"), ToString::to_string)
    }

    /// Run the delegated request and always produce a plain-text answer.
    pub async fn ask(&self, request: &str, session_id: Option<&str>, user_id: Option<&str>) -> String {
        if self.test_mode {
            return format!("[devops-test-mode] {request}");
        }

        let user_id = user_id.unwrap_or(&self.default_user_id);
        let session = Self::session_for(session_id, user_id);
        let input = AgentInput::new(request, &session, user_id);

        match tokio::time::timeout(self.timeout, self.agent.run(&input, &NoopObserver)).await {
            Ok(Ok(output)) => output.response,
            Ok(Err(e)) => {
                tracing::error!(session_id = %session, error = %e, "Error in ask_devops");
                format!("Error calling DevOps agent: {e}")
            }
            Err(_) => {
                tracing::warn!(
                    session_id = %session,
                    timeout_secs = self.timeout.as_secs(),
                    "DevOps agent timed out"
                );
                TIMEOUT_MESSAGE.to_string()
            }
        }
    }
}

#[async_trait]
impl Tool for DelegateTool {
    fn name(&self) -> &str {
        "ask_devops"
    }

    fn description(&self) -> &str {
        "Delegate a DevOps request (creating Pub/Sub topics, writing Cloud Logging entries) \
         to the DevOps agent and return its answer."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "request": {
                    "type": "string",
                    "description": "The DevOps task, in natural language."
                },
                "session_id": {
                    "type": "string",
                    "description": "Optional delegation session id; defaults to one stable session per user."
                },
                "user_id": {
                    "type": "string",
                    "description": "Optional user id for the delegated conversation."
                }
            },
            "required": ["request"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let Some(request) = required_str(&args, "request") else {
            return Ok(ToolResult::error("Missing 'request' parameter"));
        };
        let answer = self
            .ask(
                request,
                optional_str(&args, "session_id"),
                optional_str(&args, "user_id"),
            )
            .await;
        Ok(ToolResult::success(answer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentOutput, RunObserver};
    use parking_lot::Mutex;

    /// Records inputs and answers after an optional delay.
    struct RecordingAgent {
        seen: Mutex<Vec<AgentInput>>,
        delay: Duration,
        fail: bool,
    }

    impl RecordingAgent {
        fn new(delay: Duration, fail: bool) -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                delay,
                fail,
            }
        }
    }

    #[async_trait]
    impl AgentRunner for RecordingAgent {
        async fn run(
            &self,
            input: &AgentInput,
            _observer: &dyn RunObserver,
        ) -> anyhow::Result<AgentOutput> {
            self.seen.lock().push(input.clone());
            tokio::time::sleep(self.delay).await;
            if self.fail {
                anyhow::bail!("quota exceeded");
            }
            Ok(AgentOutput {
                response: format!("done: {}", input.message),
                tool_calls_made: 1,
                model: None,
            })
        }

        fn name(&self) -> &str {
            "devops_agent"
        }

        fn model(&self) -> &str {
            "test-model"
        }
    }

    #[test]
    fn session_defaults_to_delegation_prefix() {
        assert_eq!(DelegateTool::session_for(None, "main_agent"), "delegation_main_agent");
        assert_eq!(DelegateTool::session_for(Some("custom"), "main_agent"), "custom");
    }

    #[tokio::test]
    async fn delegates_with_stable_session() {
        let agent = Arc::new(RecordingAgent::new(Duration::ZERO, false));
        let tool = DelegateTool::new(agent.clone(), Duration::from_secs(5), "main_agent");

        let first = tool.ask("create topic alerts", None, None).await;
        let _ = tool.ask("and another", None, None).await;

        assert_eq!(first, "done: create topic alerts");
        let seen = agent.seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen
            .iter()
            .all(|i| i.session_id == "delegation_main_agent" && i.user_id == "main_agent"));
    }

    #[tokio::test]
    async fn timeout_returns_fixed_message() {
        let agent = Arc::new(RecordingAgent::new(Duration::from_secs(5), false));
        let tool = DelegateTool::new(agent, Duration::from_millis(20), "main_agent");
        assert_eq!(tool.ask("slow", None, None).await, TIMEOUT_MESSAGE);
    }

    #[tokio::test]
    async fn failure_is_reported_as_text() {
        let agent = Arc::new(RecordingAgent::new(Duration::ZERO, true));
        let tool = DelegateTool::new(agent, Duration::from_secs(5), "main_agent");
        assert_eq!(
            tool.ask("x", None, None).await,
            "Error calling DevOps agent: quota exceeded"
        );
    }

    #[tokio::test]
    async fn test_mode_skips_the_agent() {
        let agent = Arc::new(RecordingAgent::new(Duration::ZERO, false));
        let tool = DelegateTool::new(agent.clone(), Duration::from_secs(5), "main_agent")
            .with_test_mode(true);

        let result = tool
            .execute(json!({"request": "create topic foo"}))
            .await
            .unwrap();
        assert_eq!(
            result,
            ToolResult::success("[devops-test-mode] create topic foo")
        );
        assert!(agent.seen.lock().is_empty());
    }
}
