//! Provider subsystem for model inference backends.
//!
//! Each provider implements the [`Provider`] trait defined in [`traits`] and is
//! registered in the factory function [`create_provider_with_url`] by its canonical
//! string key. Gemini is reached through its OpenAI-compatible endpoint, so every
//! backend shares [`compatible::OpenAiCompatibleProvider`].

pub mod compatible;
pub mod traits;

pub use traits::{ChatMessage, ChatRequest, ChatResponse, Provider, ToolCall};

use compatible::{AuthStyle, OpenAiCompatibleProvider};

const MAX_API_ERROR_CHARS: usize = 200;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

fn token_end(input: &str, from: usize) -> usize {
    let mut end = from;
    for (i, c) in input[from..].char_indices() {
        if is_secret_char(c) {
            end = from + i + c.len_utf8();
        } else {
            break;
        }
    }
    end
}

/// Scrub known secret-like token prefixes from provider error strings.
///
/// Redacts tokens with prefixes like `sk-`, `AIza` (Google API keys), `ya29.`
/// (Google OAuth access tokens), `ghp_`, and `github_pat_`.
pub fn scrub_secret_patterns(input: &str) -> String {
    const PREFIXES: [&str; 6] = ["sk-", "AIza", "ya29.", "ghp_", "gho_", "github_pat_"];

    let mut scrubbed = input.to_string();

    for prefix in PREFIXES {
        let mut search_from = 0;
        loop {
            let Some(rel) = scrubbed[search_from..].find(prefix) else {
                break;
            };

            let start = search_from + rel;
            let content_start = start + prefix.len();
            let end = token_end(&scrubbed, content_start);

            if end == content_start {
                search_from = content_start;
                continue;
            }

            scrubbed.replace_range(start..end, "[REDACTED]");
            search_from = start + "[REDACTED]".len();
        }
    }

    scrubbed
}

/// Sanitize API error text by scrubbing secrets and truncating length.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);

    if scrubbed.chars().count() <= MAX_API_ERROR_CHARS {
        return scrubbed;
    }

    let mut end = MAX_API_ERROR_CHARS;
    while end > 0 && !scrubbed.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}...", &scrubbed[..end])
}

/// Build a sanitized provider error from a failed HTTP response.
pub async fn api_error(provider: &str, response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read provider error body>".to_string());
    let sanitized = sanitize_api_error(&body);
    anyhow::anyhow!("{provider} API error ({status}): {sanitized}")
}

/// Resolve API key for a provider from config and environment variables.
fn resolve_provider_credential(name: &str, credential_override: Option<&str>) -> Option<String> {
    if let Some(raw_override) = credential_override {
        let trimmed_override = raw_override.trim();
        if !trimmed_override.is_empty() {
            return Some(trimmed_override.to_owned());
        }
    }

    let provider_env_candidates: &[&str] = match name {
        "gemini" | "google" => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        "openai" => &["OPENAI_API_KEY"],
        _ => &[],
    };

    provider_env_candidates
        .iter()
        .chain(["AGENTWATCH_API_KEY", "API_KEY"].iter())
        .find_map(|env_var| {
            std::env::var(env_var)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        })
}

/// Factory: create the right provider from config (without custom URL)
pub fn create_provider(name: &str, api_key: Option<&str>) -> anyhow::Result<Box<dyn Provider>> {
    create_provider_with_url(name, api_key, None)
}

/// Factory: create the right provider from config with optional custom base URL
pub fn create_provider_with_url(
    name: &str,
    api_key: Option<&str>,
    api_url: Option<&str>,
) -> anyhow::Result<Box<dyn Provider>> {
    let resolved_credential = resolve_provider_credential(name, api_key);
    let key = resolved_credential.as_deref();
    let base_override = api_url.map(str::trim).filter(|u| !u.is_empty());

    match name {
        "gemini" | "google" => Ok(Box::new(OpenAiCompatibleProvider::new(
            "Gemini",
            base_override.unwrap_or(GEMINI_BASE_URL),
            key,
            AuthStyle::Bearer,
        ))),
        "openai" => Ok(Box::new(OpenAiCompatibleProvider::new(
            "OpenAI",
            base_override.unwrap_or(OPENAI_BASE_URL),
            key,
            AuthStyle::Bearer,
        ))),
        _ if name.starts_with("custom:") => {
            let base_url = parse_custom_provider_url(
                name.strip_prefix("custom:").unwrap_or(""),
                "Custom provider",
                "custom:https://your-api.com",
            )?;
            Ok(Box::new(OpenAiCompatibleProvider::new(
                "Custom",
                &base_url,
                key,
                AuthStyle::Bearer,
            )))
        }
        _ => anyhow::bail!(
            "Unknown provider: {name}. Supported: \"gemini\", \"openai\", \"custom:<url>\"."
        ),
    }
}

fn parse_custom_provider_url(
    raw_url: &str,
    provider_label: &str,
    format_hint: &str,
) -> anyhow::Result<String> {
    let base_url = raw_url.trim();

    if base_url.is_empty() {
        anyhow::bail!("{provider_label} requires a URL. Format: {format_hint}");
    }

    let parsed = reqwest::Url::parse(base_url).map_err(|_| {
        anyhow::anyhow!("{provider_label} requires a valid URL. Format: {format_hint}")
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(base_url.to_string()),
        _ => anyhow::bail!(
            "{provider_label} requires an http:// or https:// URL. Format: {format_hint}"
        ),
    }
}

/// Information about a supported provider for display purposes.
pub struct ProviderInfo {
    /// Canonical name used in config (e.g. `"gemini"`)
    pub name: &'static str,
    /// Human-readable display name
    pub display_name: &'static str,
    /// Alternative names accepted in config
    pub aliases: &'static [&'static str],
}

/// Return the list of all known providers for display in `agentwatch status`.
pub fn list_providers() -> Vec<ProviderInfo> {
    vec![
        ProviderInfo {
            name: "gemini",
            display_name: "Google Gemini",
            aliases: &["google"],
        },
        ProviderInfo {
            name: "openai",
            display_name: "OpenAI",
            aliases: &[],
        },
    ]
}

/// Display name for a configured provider id.
pub fn display_name(name: &str) -> String {
    if name.starts_with("custom:") {
        return "Custom (OpenAI-compatible)".to_string();
    }
    list_providers()
        .into_iter()
        .find(|p| p.name == name || p.aliases.contains(&name))
        .map_or_else(|| name.to_string(), |p| p.display_name.to_string())
}
