//! DevOps tools exposed to the delegated agent: Pub/Sub topic creation and
//! Cloud Logging writes.

use super::traits::{optional_str, required_str, Tool, ToolResult};
use crate::cloud::{CloudError, GcpClient};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub struct CreatePubsubTopicTool {
    client: Arc<GcpClient>,
}

impl CreatePubsubTopicTool {
    pub fn new(client: Arc<GcpClient>) -> Self {
        Self { client }
    }
}

pub(crate) fn topic_result(outcome: Result<String, CloudError>) -> ToolResult {
    match outcome {
        Ok(name) => ToolResult::success(format!("Created topic: {name}")),
        Err(CloudError::AlreadyExists(path)) => {
            ToolResult::success(format!("Topic already exists: {path}"))
        }
        Err(e) => ToolResult::error(format!("Failed to create topic: {e}")),
    }
}

#[async_trait]
impl Tool for CreatePubsubTopicTool {
    fn name(&self) -> &str {
        "create_pubsub_topic"
    }

    fn description(&self) -> &str {
        "Creates a Pub/Sub topic in the specified project."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "project_id": {
                    "type": "string",
                    "description": "The Google Cloud project ID."
                },
                "topic_id": {
                    "type": "string",
                    "description": "The ID of the topic to create."
                }
            },
            "required": ["project_id", "topic_id"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let Some(topic_id) = required_str(&args, "topic_id") else {
            return Ok(ToolResult::error("Missing 'topic_id' parameter"));
        };
        let Some(project_id) = optional_str(&args, "project_id").or(self.client.project_id())
        else {
            return Ok(ToolResult::error("Missing 'project_id' parameter"));
        };

        let outcome = self.client.create_topic(project_id, topic_id).await;
        if let Err(ref e) = outcome {
            tracing::warn!(project_id, topic_id, error = %e, "create_pubsub_topic failed");
        }
        Ok(topic_result(outcome))
    }
}

pub struct WriteLogEntryTool {
    client: Arc<GcpClient>,
}

impl WriteLogEntryTool {
    pub fn new(client: Arc<GcpClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for WriteLogEntryTool {
    fn name(&self) -> &str {
        "write_log_entry"
    }

    fn description(&self) -> &str {
        "Writes a log entry to Cloud Logging."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "log_name": {
                    "type": "string",
                    "description": "The name of the log to write to."
                },
                "text_payload": {
                    "type": "string",
                    "description": "The text content of the log entry."
                },
                "severity": {
                    "type": "string",
                    "description": "The severity of the log entry (e.g., INFO, WARNING, ERROR).",
                    "default": "INFO"
                }
            },
            "required": ["log_name", "text_payload"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let Some(log_name) = required_str(&args, "log_name") else {
            return Ok(ToolResult::error("Missing 'log_name' parameter"));
        };
        let Some(text_payload) = args.get("text_payload").and_then(|v| v.as_str()) else {
            return Ok(ToolResult::error("Missing 'text_payload' parameter"));
        };
        let severity = optional_str(&args, "severity").unwrap_or("INFO");

        match self
            .client
            .write_log_text(log_name, text_payload, severity)
            .await
        {
            Ok(()) => Ok(ToolResult::success(format!(
                "Wrote log entry to {log_name} with severity {severity}"
            ))),
            Err(e) => Ok(ToolResult::error(format!("Failed to write log entry: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GcpConfig;

    fn offline_client() -> Arc<GcpClient> {
        Arc::new(
            GcpClient::from_config(&GcpConfig {
                access_token: Some("test-token".into()),
                ..GcpConfig::default()
            })
            .with_endpoint_override("http://127.0.0.1:9"),
        )
    }

    #[test]
    fn already_exists_is_success() {
        let result = topic_result(Err(CloudError::AlreadyExists(
            "projects/p/topics/t".into(),
        )));
        assert_eq!(
            result,
            ToolResult::success("Topic already exists: projects/p/topics/t")
        );
    }

    #[test]
    fn created_topic_report() {
        let result = topic_result(Ok("projects/p/topics/t".into()));
        assert_eq!(result.text(), "Created topic: projects/p/topics/t");
    }

    #[test]
    fn other_failures_are_errors() {
        let result = topic_result(Err(CloudError::Api {
            service: "Pub/Sub",
            status: 403,
            message: "PERMISSION_DENIED".into(),
        }));
        assert!(!result.is_success());
        assert!(result.text().starts_with("Failed to create topic: "));
    }

    #[tokio::test]
    async fn create_topic_requires_topic_id() {
        let tool = CreatePubsubTopicTool::new(offline_client());
        let result = tool.execute(json!({"project_id": "p"})).await.unwrap();
        assert_eq!(result, ToolResult::error("Missing 'topic_id' parameter"));
    }

    #[tokio::test]
    async fn write_log_without_project_reports_failure() {
        let tool = WriteLogEntryTool::new(offline_client());
        let result = tool
            .execute(json!({"log_name": "ops", "text_payload": "deploy done"}))
            .await
            .unwrap();
        assert_eq!(
            result,
            ToolResult::error("Failed to write log entry: GCP_PROJECT_ID not configured.")
        );
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_error_envelope() {
        let tool = CreatePubsubTopicTool::new(offline_client());
        let result = tool
            .execute(json!({"project_id": "p", "topic_id": "t"}))
            .await
            .unwrap();
        assert!(!result.is_success());
        assert!(result.text().starts_with("Failed to create topic: "));
    }
}
