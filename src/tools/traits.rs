use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result envelope returned to the model after a tool runs.
///
/// Serializes as `{"status":"success","report":...}` or
/// `{"status":"error","error_message":...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ToolResult {
    Success { report: String },
    Error { error_message: String },
}

impl ToolResult {
    pub fn success(report: impl Into<String>) -> Self {
        Self::Success {
            report: report.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error_message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Report text on success, error message otherwise.
    pub fn text(&self) -> &str {
        match self {
            Self::Success { report } => report,
            Self::Error { error_message } => error_message,
        }
    }

    /// JSON form fed back to the model as a `tool` message.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"status\":\"error\",\"error_message\":{:?}}}",
                "failed to serialize tool result"
            )
        })
    }
}

/// Description of a tool for the LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Core tool trait: implement for any capability the agent can call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (used in LLM function calling)
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// JSON schema for parameters
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with given arguments.
    ///
    /// Expected failures are reported through [`ToolResult::Error`]; an `Err`
    /// is converted into an error envelope by the agent loop.
    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult>;

    /// Get the full spec for LLM registration
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Read a required, non-empty string argument.
pub(crate) fn required_str<'a>(args: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Read an optional string argument, treating empty strings as absent.
pub(crate) fn optional_str<'a>(args: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    required_str(args, key)
}
