//! OAuth access tokens for Google Cloud APIs.

use super::CloudError;
use crate::config::GcpConfig;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens are refreshed this long before they expire.
const REFRESH_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + ChronoDuration::seconds(REFRESH_SKEW_SECS) < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    #[serde(default)]
    expires_in: i64,
}

enum Source {
    Static(String),
    Metadata {
        http: reqwest::Client,
        url: String,
        cache: Mutex<Option<CachedToken>>,
    },
}

/// Supplies bearer tokens: a configured static token, or the GCE / Cloud Run
/// metadata server with caching.
pub struct TokenSource {
    source: Source,
}

impl TokenSource {
    pub fn from_config(gcp: &GcpConfig, http: reqwest::Client) -> Self {
        match gcp
            .access_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            Some(token) => Self::fixed(token),
            None => Self::metadata(http, METADATA_TOKEN_URL),
        }
    }

    pub fn fixed(token: &str) -> Self {
        Self {
            source: Source::Static(token.to_string()),
        }
    }

    pub fn metadata(http: reqwest::Client, url: &str) -> Self {
        Self {
            source: Source::Metadata {
                http,
                url: url.to_string(),
                cache: Mutex::new(None),
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self.source {
            Source::Static(_) => "static",
            Source::Metadata { .. } => "metadata",
        }
    }

    /// Return a valid access token, fetching a new one when the cache is stale.
    pub async fn access_token(&self) -> Result<String, CloudError> {
        match &self.source {
            Source::Static(token) => Ok(token.clone()),
            Source::Metadata { http, url, cache } => {
                let mut guard = cache.lock().await;
                let now = Utc::now();
                if let Some(cached) = guard.as_ref().filter(|c| c.is_fresh(now)) {
                    return Ok(cached.value.clone());
                }

                let fetched = fetch_metadata_token(http, url).await?;
                tracing::debug!(expires_in = fetched.expires_in, "Fetched metadata access token");
                let token = CachedToken {
                    value: fetched.access_token,
                    expires_at: now + ChronoDuration::seconds(fetched.expires_in.max(0)),
                };
                let value = token.value.clone();
                *guard = Some(token);
                Ok(value)
            }
        }
    }
}

async fn fetch_metadata_token(
    http: &reqwest::Client,
    url: &str,
) -> Result<MetadataToken, CloudError> {
    let response = http
        .get(url)
        .header("Metadata-Flavor", "Google")
        .timeout(std::time::Duration::from_secs(5))
        .send()
        .await
        .map_err(|e| CloudError::Auth(format!("metadata server unreachable: {e}")))?;

    if !response.status().is_success() {
        return Err(CloudError::Auth(format!(
            "metadata server returned {}",
            response.status()
        )));
    }

    let token: MetadataToken = response
        .json()
        .await
        .map_err(|e| CloudError::Decode(format!("metadata token: {e}")))?;
    if token.access_token.is_empty() {
        return Err(CloudError::Auth("metadata server returned an empty token".into()));
    }
    Ok(token)
}
