//! Agent runtime traits shared by the gateway, the delegation tool, and tests.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One user turn handed to an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInput {
    pub message: String,
    pub session_id: String,
    pub user_id: String,
}

impl AgentInput {
    pub fn new(message: &str, session_id: &str, user_id: &str) -> Self {
        Self {
            message: message.to_string(),
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
        }
    }
}

/// Final answer for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutput {
    pub response: String,
    pub tool_calls_made: u32,
    pub model: Option<String>,
}

/// Receives runtime events while an agent turn is in flight.
pub trait RunObserver: Send + Sync {
    /// Called once per tool invocation, before the tool runs.
    fn on_tool_call(&self, tool_name: &str);
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {
    fn on_tool_call(&self, _tool_name: &str) {}
}

/// An agent that turns a user message into a final response.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Run one turn, reporting tool calls to `observer`.
    async fn run(&self, input: &AgentInput, observer: &dyn RunObserver) -> Result<AgentOutput>;

    fn name(&self) -> &str;

    fn model(&self) -> &str;
}
