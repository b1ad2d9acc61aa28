//! Secret Manager access, used to populate credentials at startup.

use super::{api_error, CloudError, GcpClient};
use base64::Engine;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct AccessResponse {
    payload: Payload,
}

#[derive(Debug, Deserialize)]
struct Payload {
    data: String,
}

/// Fully-qualified secret version name. Ids that already start with
/// `projects/` are returned unchanged.
pub fn build_secret_name(secret_id: &str, project_id: Option<&str>, version: &str) -> Result<String, CloudError> {
    if secret_id.starts_with("projects/") {
        return Ok(secret_id.to_string());
    }
    let project_id = project_id
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or(CloudError::MissingConfig("GCP_PROJECT_ID"))?;
    Ok(format!(
        "projects/{project_id}/secrets/{secret_id}/versions/{version}"
    ))
}

impl GcpClient {
    /// Fetch and decode a secret payload.
    pub async fn access_secret_version(&self, secret_id: &str, version: &str) -> Result<String, CloudError> {
        let name = build_secret_name(secret_id, self.project_id(), version)?;
        let url = format!("{}/v1/{name}:access", self.endpoints.secrets);

        let response = self
            .authorized(self.http().get(&url))
            .await?
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(api_error("Secret Manager", response).await);
        }

        let parsed: AccessResponse = response
            .json()
            .await
            .map_err(|e| CloudError::Decode(e.to_string()))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(parsed.payload.data.as_bytes())
            .map_err(|e| CloudError::Decode(format!("secret payload: {e}")))?;
        String::from_utf8(bytes).map_err(|e| CloudError::Decode(format!("secret payload: {e}")))
    }
}

/// Resolve a credential: keep `current` when set, otherwise load `secret_id`
/// from Secret Manager. Returns `None` when neither is available.
pub async fn resolve_secret(
    client: &GcpClient,
    current: Option<&str>,
    secret_id: Option<&str>,
) -> Result<Option<String>, CloudError> {
    if let Some(value) = current.map(str::trim).filter(|v| !v.is_empty()) {
        return Ok(Some(value.to_string()));
    }
    let Some(secret_id) = secret_id.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    let value = client.access_secret_version(secret_id, "latest").await?;
    tracing::info!(secret_id, "Loaded credential from Secret Manager");
    Ok(Some(value.trim().to_string()))
}
