use super::{api_error, CloudError, GcpClient};
use serde::Deserialize;
use serde_json::{json, Value};

const PAGE_SIZE: u32 = 3;

/// One search result, flattened from the document's derived struct data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
    pub link: String,
}

impl SearchHit {
    pub fn render(&self) -> String {
        format!(
            "Title: {}\nSnippet: {}\nLink: {}",
            self.title, self.snippet, self.link
        )
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    document: Option<Document>,
}

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default, rename = "derivedStructData")]
    derived_struct_data: Option<Value>,
}

fn first_snippet(data: &Value) -> String {
    let list = data
        .get("snippets")
        .filter(|v| v.as_array().is_some_and(|a| !a.is_empty()))
        .or_else(|| data.get("extractive_answers"));

    let Some(first) = list.and_then(Value::as_array).and_then(|a| a.first()) else {
        return String::new();
    };

    match first {
        Value::Object(obj) => obj
            .get("snippet")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .or_else(|| obj.get("content").and_then(Value::as_str))
            .unwrap_or_default()
            .to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn hit_from_struct_data(data: &Value) -> SearchHit {
    SearchHit {
        title: data
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("No Title")
            .to_string(),
        snippet: first_snippet(data),
        link: data
            .get("link")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    }
}

impl GcpClient {
    /// Query the configured Vertex AI Search data store.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, CloudError> {
        let (Some(project_id), Some(data_store)) =
            (self.project_id.as_deref(), self.data_store_id.as_deref())
        else {
            return Err(CloudError::MissingConfig(
                "GCP_PROJECT_ID or VERTEX_SEARCH_DATA_STORE_ID",
            ));
        };

        let serving_config = format!(
            "projects/{project_id}/locations/{}/collections/default_collection/dataStores/{data_store}/servingConfigs/default_config",
            self.location
        );
        let url = format!("{}/v1/{serving_config}:search", self.endpoints.search);
        let body = json!({"query": query, "pageSize": PAGE_SIZE});

        let response = self
            .authorized(self.http().post(&url).json(&body))
            .await?
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error("Discovery Engine", response).await);
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| CloudError::Decode(e.to_string()))?;

        Ok(parsed
            .results
            .iter()
            .map(|r| {
                r.document
                    .as_ref()
                    .and_then(|d| d.derived_struct_data.as_ref())
                    .map_or_else(|| hit_from_struct_data(&Value::Null), hit_from_struct_data)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GcpConfig;

    #[test]
    fn snippet_prefers_snippets_list() {
        let data = json!({
            "title": "Runbook",
            "snippets": [{"snippet": "Restart the pod"}],
            "link": "gs://docs/runbook.pdf"
        });
        let hit = hit_from_struct_data(&data);
        assert_eq!(hit.title, "Runbook");
        assert_eq!(hit.snippet, "Restart the pod");
        assert_eq!(
            hit.render(),
            "Title: Runbook\nSnippet: Restart the pod\nLink: gs://docs/runbook.pdf"
        );
    }

    #[test]
    fn snippet_falls_back_to_extractive_answer_content() {
        let data = json!({"extractive_answers": [{"content": "Answer text"}]});
        let hit = hit_from_struct_data(&data);
        assert_eq!(hit.title, "No Title");
        assert_eq!(hit.snippet, "Answer text");
        assert_eq!(hit.link, "");
    }

    #[test]
    fn snippet_accepts_plain_strings() {
        let data = json!({"snippets": ["raw"]});
        assert_eq!(hit_from_struct_data(&data).snippet, "raw");
    }

    #[tokio::test]
    async fn search_requires_project_and_store() {
        let client = GcpClient::from_config(&GcpConfig {
            project_id: Some("proj".into()),
            access_token: Some("t".into()),
            ..GcpConfig::default()
        });
        let err = client.search("anything").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "GCP_PROJECT_ID or VERTEX_SEARCH_DATA_STORE_ID not configured."
        );
    }
}
