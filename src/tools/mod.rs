//! Tool subsystem for agent-callable capabilities.
//!
//! Each tool implements the [`Tool`] trait defined in [`traits`], which requires
//! a name, description, JSON parameter schema, and an async `execute` method
//! returning a [`ToolResult`] envelope.
//!
//! Two registries are assembled here: [`root_tools`] for the chat agent and
//! [`devops_tools`] for the delegated DevOps agent.

pub mod delegate;
pub mod devops;
pub mod knowledge;
pub mod session_report;
pub mod time;
pub mod traits;
pub mod weather;

pub use delegate::DelegateTool;
pub use devops::{CreatePubsubTopicTool, WriteLogEntryTool};
pub use knowledge::KnowledgeSearchTool;
pub use session_report::{SessionDetailsTool, SessionSummaryTool};
pub use time::CurrentTimeTool;
pub use traits::Tool;
pub use traits::{ToolResult, ToolSpec};
pub use weather::WeatherTool;

use crate::cloud::GcpClient;
use crate::monitor::SessionMonitor;
use std::sync::Arc;

/// Tools available to the chat agent, in registration order.
pub fn root_tools(
    delegate: DelegateTool,
    gcp: Arc<GcpClient>,
    monitor: Arc<SessionMonitor>,
) -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(WeatherTool),
        Box::new(CurrentTimeTool),
        Box::new(delegate),
        Box::new(KnowledgeSearchTool::new(gcp)),
        Box::new(SessionSummaryTool::new(monitor.clone())),
        Box::new(SessionDetailsTool::new(monitor)),
    ]
}

/// Tools available to the DevOps agent.
pub fn devops_tools(gcp: Arc<GcpClient>) -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(CreatePubsubTopicTool::new(gcp.clone())),
        Box::new(WriteLogEntryTool::new(gcp)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentInput, AgentOutput, AgentRunner, RunObserver};
    use crate::config::GcpConfig;
    use async_trait::async_trait;
    use std::time::Duration;

    struct IdleAgent;

    #[async_trait]
    impl AgentRunner for IdleAgent {
        async fn run(&self, _: &AgentInput, _: &dyn RunObserver) -> anyhow::Result<AgentOutput> {
            anyhow::bail!("not used")
        }

        fn name(&self) -> &str {
            "idle"
        }

        fn model(&self) -> &str {
            "none"
        }
    }

    fn all_registered() -> Vec<Box<dyn Tool>> {
        let gcp = Arc::new(GcpClient::from_config(&GcpConfig::default()));
        let delegate = DelegateTool::new(Arc::new(IdleAgent), Duration::from_secs(1), "main_agent");
        let mut tools = root_tools(delegate, gcp.clone(), Arc::new(SessionMonitor::default()));
        tools.extend(devops_tools(gcp));
        tools
    }

    #[test]
    fn root_tools_names() {
        let gcp = Arc::new(GcpClient::from_config(&GcpConfig::default()));
        let delegate = DelegateTool::new(Arc::new(IdleAgent), Duration::from_secs(1), "main_agent");
        let tools = root_tools(delegate, gcp, Arc::new(SessionMonitor::default()));
        let names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        assert_eq!(
            names,
            vec![
                "get_weather",
                "get_current_time",
                "ask_devops",
                "search_knowledge_base",
                "get_session_summary",
                "get_session_details",
            ]
        );
    }

    #[test]
    fn devops_tools_names() {
        let gcp = Arc::new(GcpClient::from_config(&GcpConfig::default()));
        let names: Vec<String> = devops_tools(gcp)
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(names, vec!["create_pubsub_topic", "write_log_entry"]);
    }

    #[test]
    fn tools_all_have_descriptions_and_schemas() {
        for tool in all_registered() {
            assert!(
                !tool.description().is_empty(),
                "Tool {} has empty description",
                tool.name()
            );
            let schema = tool.parameters_schema();
            assert!(
                schema["properties"].is_object(),
                "Tool {} schema has no properties",
                tool.name()
            );
        }
    }

    #[test]
    fn tool_spec_generation() {
        for tool in all_registered() {
            let spec = tool.spec();
            assert_eq!(spec.name, tool.name());
            assert_eq!(spec.description, tool.description());
            assert!(spec.parameters.is_object());
        }
    }

    #[test]
    fn tool_names_are_unique() {
        let tools = all_registered();
        let mut names = std::collections::HashSet::new();
        for tool in &tools {
            assert!(names.insert(tool.name().to_string()), "duplicate {}", tool.name());
        }
    }
}
