//! Agent runtime: the chat agent and the DevOps sub-agent it delegates to.
//!
//! Both are [`ToolLoopAgent`]s sharing one provider and one conversation store;
//! they differ in instruction and tool registry. The chat agent reaches the
//! sub-agent only through the `ask_devops` tool.

pub mod loop_;
pub mod traits;

#[cfg(test)]
mod tests;

pub use loop_::{AgentDefinition, ToolLoopAgent};
pub use traits::{AgentInput, AgentOutput, AgentRunner, NoopObserver, RunObserver};

use crate::cloud::GcpClient;
use crate::config::Config;
use crate::monitor::SessionMonitor;
use crate::providers::Provider;
use crate::sessions::ConversationStore;
use crate::tools::{self, DelegateTool};
use std::sync::Arc;
use std::time::Duration;

/// Shared dependencies for building agents.
#[derive(Clone)]
pub struct AgentDeps {
    pub provider: Arc<dyn Provider>,
    pub store: Arc<dyn ConversationStore>,
    pub gcp: Arc<GcpClient>,
    pub monitor: Arc<SessionMonitor>,
}

/// The DevOps specialist: Pub/Sub topics and Cloud Logging writes.
pub fn build_devops_agent(config: &Config, deps: &AgentDeps) -> ToolLoopAgent {
    let definition = AgentDefinition {
        name: config.delegation.agent_name.clone(),
        description: "A specialized agent that handles DevOps tasks on Google Cloud Platform."
            .to_string(),
        instruction: config.delegation.instruction.clone(),
        model: config.model().to_string(),
        temperature: config.default_temperature,
        max_tool_iterations: config.agent.max_tool_iterations,
        max_history_messages: config.agent.max_history_messages,
    };
    ToolLoopAgent::new(
        definition,
        Arc::clone(&deps.provider),
        tools::devops_tools(Arc::clone(&deps.gcp)),
        Arc::clone(&deps.store),
    )
}

/// The chat agent, wired to `devops` through the `ask_devops` tool.
pub fn build_root_agent(
    config: &Config,
    deps: &AgentDeps,
    devops: Arc<dyn AgentRunner>,
) -> ToolLoopAgent {
    let delegate = DelegateTool::new(
        devops,
        Duration::from_secs(config.delegation.timeout_secs),
        &config.delegation.default_user_id,
    )
    .with_test_mode(config.gateway.test_mode);

    let definition = AgentDefinition {
        name: config.agent.name.clone(),
        description: config.agent.description.clone(),
        instruction: config.agent.instruction.clone(),
        model: config.model().to_string(),
        temperature: config.default_temperature,
        max_tool_iterations: config.agent.max_tool_iterations,
        max_history_messages: config.agent.max_history_messages,
    };
    ToolLoopAgent::new(
        definition,
        Arc::clone(&deps.provider),
        tools::root_tools(delegate, Arc::clone(&deps.gcp), Arc::clone(&deps.monitor)),
        Arc::clone(&deps.store),
    )
}

/// Build the DevOps agent and the chat agent that delegates to it.
pub fn build_agents(config: &Config, deps: &AgentDeps) -> Arc<dyn AgentRunner> {
    let devops: Arc<dyn AgentRunner> = Arc::new(build_devops_agent(config, deps));
    Arc::new(build_root_agent(config, deps, devops))
}
