//! Google Cloud REST clients used by the DevOps and knowledge-base tools.
//!
//! Every call goes through [`GcpClient`], which owns one `reqwest::Client`, a
//! [`TokenSource`] for OAuth access tokens, and the resolved service endpoints.
//! Each API lives in its own submodule as an `impl GcpClient` block.

pub mod auth;
pub mod logging;
pub mod pubsub;
pub mod search;
pub mod secrets;

pub use auth::TokenSource;
pub use search::SearchHit;
pub use secrets::{build_secret_name, resolve_secret};

use crate::config::GcpConfig;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Errors returned by the Google Cloud clients.
#[derive(Debug, thiserror::Error)]
pub enum CloudError {
    #[error("{0} not configured.")]
    MissingConfig(&'static str),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("resource already exists: {0}")]
    AlreadyExists(String),
    #[error("{service} API error ({status}): {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid response: {0}")]
    Decode(String),
}

/// Resolved service base URLs.
#[derive(Debug, Clone)]
pub(crate) struct Endpoints {
    pub pubsub: String,
    pub logging: String,
    pub search: String,
    pub secrets: String,
}

impl Endpoints {
    fn from_config(gcp: &GcpConfig) -> Self {
        let pubsub = gcp.effective_pubsub_region().map_or_else(
            || "https://pubsub.googleapis.com".to_string(),
            |region| format!("https://{region}-pubsub.googleapis.com"),
        );
        let location = gcp.search_location();
        let search = if location == "global" {
            "https://discoveryengine.googleapis.com".to_string()
        } else {
            format!("https://{location}-discoveryengine.googleapis.com")
        };
        Self {
            pubsub,
            logging: "https://logging.googleapis.com".to_string(),
            search,
            secrets: "https://secretmanager.googleapis.com".to_string(),
        }
    }

    fn all(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            pubsub: base.clone(),
            logging: base.clone(),
            search: base.clone(),
            secrets: base,
        }
    }
}

/// Shared Google Cloud REST client.
#[derive(Clone)]
pub struct GcpClient {
    http: reqwest::Client,
    tokens: Arc<TokenSource>,
    pub(crate) endpoints: Endpoints,
    pub(crate) project_id: Option<String>,
    pub(crate) location: String,
    pub(crate) data_store_id: Option<String>,
}

impl GcpClient {
    pub fn from_config(gcp: &GcpConfig) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let tokens = Arc::new(TokenSource::from_config(gcp, http.clone()));

        Self {
            http,
            tokens,
            endpoints: Endpoints::from_config(gcp),
            project_id: non_empty(gcp.project_id.as_deref()),
            location: gcp.search_location().to_string(),
            data_store_id: non_empty(gcp.search_data_store_id.as_deref()),
        }
    }

    /// Route every service to `base` (local emulators and tests).
    #[must_use]
    pub fn with_endpoint_override(mut self, base: &str) -> Self {
        self.endpoints = Endpoints::all(base);
        self
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    async fn authorized(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, CloudError> {
        let token = self.tokens.access_token().await?;
        Ok(builder.bearer_auth(token))
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Turn a non-success response into [`CloudError::Api`].
pub(crate) async fn api_error(service: &'static str, response: reqwest::Response) -> CloudError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<GoogleErrorBody>(&body) {
        Ok(parsed) => match parsed.error.status {
            Some(code) if !code.is_empty() => format!("{code}: {}", parsed.error.message),
            _ => parsed.error.message,
        },
        Err(_) => body,
    };
    CloudError::Api {
        service,
        status,
        message: crate::providers::sanitize_api_error(&message),
    }
}
