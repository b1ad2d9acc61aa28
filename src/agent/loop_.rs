//! Tool-calling agent loop.
//!
//! Each turn replays the stored conversation, sends it to the provider with the
//! agent's tool specs, executes any requested tools, and feeds the JSON result
//! envelopes back until the model answers with plain text.

use super::traits::{AgentInput, AgentOutput, AgentRunner, RunObserver};
use crate::providers::{ChatMessage, ChatRequest, Provider, ToolCall};
use crate::sessions::{ConversationKey, ConversationStore, TranscriptEntry};
use crate::tools::{Tool, ToolResult, ToolSpec};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Static definition of an agent: identity, prompt, and loop bounds.
#[derive(Debug, Clone)]
pub struct AgentDefinition {
    pub name: String,
    pub description: String,
    pub instruction: String,
    pub model: String,
    pub temperature: f64,
    pub max_tool_iterations: usize,
    pub max_history_messages: usize,
}

/// Agent runtime that loops provider calls and tool executions.
pub struct ToolLoopAgent {
    definition: AgentDefinition,
    provider: Arc<dyn Provider>,
    tools: Vec<Box<dyn Tool>>,
    store: Arc<dyn ConversationStore>,
}

impl ToolLoopAgent {
    pub fn new(
        definition: AgentDefinition,
        provider: Arc<dyn Provider>,
        tools: Vec<Box<dyn Tool>>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            definition,
            provider,
            tools,
            store,
        }
    }

    pub fn definition(&self) -> &AgentDefinition {
        &self.definition
    }

    pub fn tool_specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    fn find_tool(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    async fn execute_tool(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.find_tool(&call.name) else {
            tracing::warn!(agent = %self.definition.name, tool = %call.name, "Unknown tool requested");
            return ToolResult::error(format!("Unknown tool: {}", call.name));
        };

        let args: serde_json::Value = match serde_json::from_str(&call.arguments) {
            Ok(value) => value,
            Err(e) => {
                return ToolResult::error(format!(
                    "Invalid JSON arguments for {}: {e}",
                    call.name
                ))
            }
        };

        match tool.execute(args).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(agent = %self.definition.name, tool = %call.name, error = %e, "Tool execution failed");
                ToolResult::error(format!("Tool {} failed: {e}", call.name))
            }
        }
    }

    async fn build_messages(&self, key: &ConversationKey, message: &str) -> Result<Vec<ChatMessage>> {
        let history = self
            .store
            .get_transcript(key, Some(self.definition.max_history_messages))
            .await?;

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.definition.instruction.clone()));
        messages.extend(history.iter().map(TranscriptEntry::to_chat_message));
        messages.push(ChatMessage::user(message));
        Ok(messages)
    }
}

#[async_trait]
impl AgentRunner for ToolLoopAgent {
    async fn run(&self, input: &AgentInput, observer: &dyn RunObserver) -> Result<AgentOutput> {
        let key = ConversationKey::new(&self.definition.name, &input.user_id, &input.session_id);
        self.store.ensure(&key).await?;

        let mut messages = self.build_messages(&key, &input.message).await?;
        let specs = self.tool_specs();
        let tools = (self.provider.supports_native_tools() && !specs.is_empty())
            .then_some(specs.as_slice());

        let mut tool_calls_made = 0u32;
        for iteration in 0..self.definition.max_tool_iterations {
            let response = self
                .provider
                .chat(
                    ChatRequest {
                        messages: &messages,
                        tools,
                    },
                    &self.definition.model,
                    self.definition.temperature,
                )
                .await?;

            if !response.has_tool_calls() {
                let text = response.text.unwrap_or_default();
                self.store
                    .append_transcript(&key, TranscriptEntry::new("user", &input.message))
                    .await?;
                self.store
                    .append_transcript(&key, TranscriptEntry::new("assistant", &text))
                    .await?;
                tracing::debug!(
                    agent = %self.definition.name,
                    session_id = %input.session_id,
                    iterations = iteration + 1,
                    tool_calls_made,
                    "Agent turn complete"
                );
                return Ok(AgentOutput {
                    response: text,
                    tool_calls_made,
                    model: Some(self.definition.model.clone()),
                });
            }

            let calls = response.tool_calls;
            messages.push(ChatMessage::assistant_with_tools(
                response.text.unwrap_or_default(),
                calls.clone(),
            ));

            for call in &calls {
                observer.on_tool_call(&call.name);
                tool_calls_made += 1;
                tracing::info!(
                    agent = %self.definition.name,
                    session_id = %input.session_id,
                    tool = %call.name,
                    "tool_call"
                );
                let result = self.execute_tool(call).await;
                messages.push(ChatMessage::tool(call.id.clone(), result.to_json()));
            }
        }

        bail!(
            "{} exceeded the maximum of {} tool iterations",
            self.definition.name,
            self.definition.max_tool_iterations
        )
    }

    fn name(&self) -> &str {
        &self.definition.name
    }

    fn model(&self) -> &str {
        &self.definition.model
    }
}
