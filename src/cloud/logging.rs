use super::{api_error, CloudError, GcpClient};
use serde_json::json;

const KNOWN_SEVERITIES: [&str; 9] = [
    "DEFAULT",
    "DEBUG",
    "INFO",
    "NOTICE",
    "WARNING",
    "ERROR",
    "CRITICAL",
    "ALERT",
    "EMERGENCY",
];

/// Uppercase a severity name; unknown names map to `DEFAULT`.
pub fn normalize_severity(raw: &str) -> &'static str {
    let upper = raw.trim().to_ascii_uppercase();
    let upper = if upper == "WARN" { "WARNING".to_string() } else { upper };
    KNOWN_SEVERITIES
        .iter()
        .find(|s| **s == upper)
        .copied()
        .unwrap_or("DEFAULT")
}

/// Percent-encode a log id for use inside `logName`.
pub fn encode_log_id(log_name: &str) -> String {
    let mut out = String::with_capacity(log_name.len());
    for byte in log_name.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

impl GcpClient {
    /// Write one text entry to Cloud Logging against the `global` resource.
    pub async fn write_log_text(
        &self,
        log_name: &str,
        text_payload: &str,
        severity: &str,
    ) -> Result<(), CloudError> {
        let project_id = self
            .project_id()
            .ok_or(CloudError::MissingConfig("GCP_PROJECT_ID"))?;

        let body = json!({
            "logName": format!("projects/{project_id}/logs/{}", encode_log_id(log_name)),
            "resource": {"type": "global"},
            "entries": [{
                "textPayload": text_payload,
                "severity": normalize_severity(severity),
            }],
        });

        let url = format!("{}/v2/entries:write", self.endpoints.logging);
        let response = self
            .authorized(self.http().post(&url).json(&body))
            .await?
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error("Cloud Logging", response).await);
        }
        Ok(())
    }
}
