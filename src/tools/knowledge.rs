use super::traits::{required_str, Tool, ToolResult};
use crate::cloud::{GcpClient, SearchHit};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

/// Vertex AI Search lookup over the project documentation data store.
pub struct KnowledgeSearchTool {
    client: Arc<GcpClient>,
}

impl KnowledgeSearchTool {
    pub fn new(client: Arc<GcpClient>) -> Self {
        Self { client }
    }
}

pub fn render_hits(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No results found.".to_string();
    }
    hits.iter()
        .map(SearchHit::render)
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl Tool for KnowledgeSearchTool {
    fn name(&self) -> &str {
        "search_knowledge_base"
    }

    fn description(&self) -> &str {
        "Searches the knowledge base (Vertex AI Search) for relevant information."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "The search query."}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let Some(query) = required_str(&args, "query") else {
            return Ok(ToolResult::error("Missing 'query' parameter"));
        };

        match self.client.search(query).await {
            Ok(hits) => Ok(ToolResult::success(render_hits(&hits))),
            Err(e @ crate::cloud::CloudError::MissingConfig(_)) => {
                Ok(ToolResult::error(e.to_string()))
            }
            Err(e) => Ok(ToolResult::error(format!("Search failed: {e}"))),
        }
    }
}
