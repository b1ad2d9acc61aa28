use super::{api_error, CloudError, GcpClient};
use serde::Deserialize;
use std::time::Duration;

const CREATE_TOPIC_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct Topic {
    name: String,
}

pub fn topic_path(project_id: &str, topic_id: &str) -> String {
    format!("projects/{project_id}/topics/{topic_id}")
}

impl GcpClient {
    /// Create a Pub/Sub topic and return its full resource name.
    ///
    /// An existing topic yields [`CloudError::AlreadyExists`] carrying the path.
    pub async fn create_topic(&self, project_id: &str, topic_id: &str) -> Result<String, CloudError> {
        let path = topic_path(project_id, topic_id);
        let url = format!("{}/v1/{path}", self.endpoints.pubsub);

        let request = self
            .authorized(
                self.http()
                    .put(&url)
                    .timeout(CREATE_TOPIC_TIMEOUT)
                    .json(&serde_json::json!({})),
            )
            .await?;
        let response = request.send().await?;

        if response.status() == reqwest::StatusCode::CONFLICT {
            return Err(CloudError::AlreadyExists(path));
        }
        if !response.status().is_success() {
            return Err(api_error("Pub/Sub", response).await);
        }

        let topic: Topic = response
            .json()
            .await
            .map_err(|e| CloudError::Decode(e.to_string()))?;
        Ok(topic.name)
    }
}
