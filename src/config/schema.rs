use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
#[cfg(unix)]
use tokio::fs::File;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

const CONFIG_DIR_ENV: &str = "AGENTWATCH_CONFIG_DIR";

// ── Top-level config ──────────────────────────────────────────────

/// Top-level agentwatch configuration, loaded from `config.toml`.
///
/// Resolution order: `AGENTWATCH_CONFIG_DIR` env → `~/.agentwatch/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed at load time, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,
    /// API key for the selected provider. Overridden by `AGENTWATCH_API_KEY` or `API_KEY` env vars.
    pub api_key: Option<String>,
    /// Base URL override for the provider API (OpenAI-compatible endpoint).
    pub api_url: Option<String>,
    /// Provider ID (`"gemini"`, `"openai"`, `"custom:<url>"`). Default: `"gemini"`.
    pub default_provider: Option<String>,
    /// Model used by both the chat agent and the delegated DevOps agent.
    pub default_model: Option<String>,
    /// Default model temperature (0.0–2.0). Default: `0.7`.
    pub default_temperature: f64,

    /// Chat agent definition (`[agent]`).
    #[serde(default)]
    pub agent: AgentConfig,

    /// Delegated sub-agent settings (`[delegation]`).
    #[serde(default)]
    pub delegation: DelegationConfig,

    /// Session monitor bounds (`[monitor]`).
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// HTTP gateway settings (`[gateway]`).
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Google Cloud project and data store settings (`[gcp]`).
    #[serde(default)]
    pub gcp: GcpConfig,

    /// Telegram bridge settings (`[telegram]`).
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Logging configuration (`[observability]`).
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ── Agent ────────────────────────────────────────────────────────

/// Chat agent configuration (`[agent]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent name reported by `/stats` and recorded in the session monitor.
    #[serde(default = "default_agent_name")]
    pub name: String,
    #[serde(default = "default_agent_description")]
    pub description: String,
    /// System instruction sent ahead of every conversation.
    #[serde(default = "default_agent_instruction")]
    pub instruction: String,
    /// Maximum tool-call loop turns per user message. Default: `10`.
    #[serde(default = "default_agent_max_tool_iterations")]
    pub max_tool_iterations: usize,
    /// Maximum conversation history messages replayed per turn. Default: `50`.
    #[serde(default = "default_agent_max_history_messages")]
    pub max_history_messages: usize,
}

fn default_agent_name() -> String {
    "gemini_agent".into()
}

fn default_agent_description() -> String {
    "A helpful agent that can answer questions, check weather/time, and search the knowledge base. \
     It can also delegate DevOps tasks to a specialized DevOps agent."
        .into()
}

fn default_agent_instruction() -> String {
    "You are a helpful AI assistant. \
     You can answer general questions and use your tools to provide specific information \
     about weather and time when asked. \
     Use 'search_knowledge_base' if the user asks for information that might be in the docs. \
     If the user asks for DevOps tasks like creating Pub/Sub topics or writing logs, \
     use the 'ask_devops' tool to delegate the request. \
     Use 'get_session_summary' and 'get_session_details' to report on chat sessions. \
     Always be polite and concise."
        .into()
}

fn default_agent_max_tool_iterations() -> usize {
    10
}

fn default_agent_max_history_messages() -> usize {
    50
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            description: default_agent_description(),
            instruction: default_agent_instruction(),
            max_tool_iterations: default_agent_max_tool_iterations(),
            max_history_messages: default_agent_max_history_messages(),
        }
    }
}

// ── Delegation ───────────────────────────────────────────────────

/// Delegated DevOps agent configuration (`[delegation]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationConfig {
    #[serde(default = "default_delegate_name")]
    pub agent_name: String,
    #[serde(default = "default_delegate_instruction")]
    pub instruction: String,
    /// Bounded wait for one delegated request. Default: `30`.
    #[serde(default = "default_delegate_timeout_secs")]
    pub timeout_secs: u64,
    /// User id used when the caller does not name one. Default: `"main_agent"`.
    #[serde(default = "default_delegate_user_id")]
    pub default_user_id: String,
}

fn default_delegate_name() -> String {
    "devops_agent".into()
}

fn default_delegate_instruction() -> String {
    "You are a DevOps specialist agent. Your goal is to help users manage their \
     Google Cloud Platform resources. You can create Pub/Sub topics and write \
     logs to Cloud Logging. Always confirm the action you took."
        .into()
}

fn default_delegate_timeout_secs() -> u64 {
    30
}

fn default_delegate_user_id() -> String {
    "main_agent".into()
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            agent_name: default_delegate_name(),
            instruction: default_delegate_instruction(),
            timeout_secs: default_delegate_timeout_secs(),
            default_user_id: default_delegate_user_id(),
        }
    }
}

// ── Monitor ──────────────────────────────────────────────────────

/// Session monitor configuration (`[monitor]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Events retained per session (oldest dropped first). Default: `50`.
    #[serde(default = "default_monitor_max_events")]
    pub max_events: usize,
    /// Maximum tracked sessions; `0` means unbounded. Default: `0`.
    #[serde(default)]
    pub max_sessions: usize,
    /// Events shown by the detail report. Default: `10`.
    #[serde(default = "default_monitor_detail_events")]
    pub detail_events: usize,
}

fn default_monitor_max_events() -> usize {
    50
}

fn default_monitor_detail_events() -> usize {
    10
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_events: default_monitor_max_events(),
            max_sessions: 0,
            detail_events: default_monitor_detail_events(),
        }
    }
}

// ── Gateway ──────────────────────────────────────────────────────

/// Gateway server configuration (`[gateway]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway port (default: 8000)
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Gateway host (default: 127.0.0.1)
    #[serde(default = "default_gateway_host")]
    pub host: String,
    /// Upper bound for a single HTTP request, agent run included.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Latency samples kept for `/stats`. Default: `200`.
    #[serde(default = "default_latency_window")]
    pub latency_window: usize,
    /// User id attributed to web chat requests.
    #[serde(default = "default_gateway_user_id")]
    pub default_user_id: String,
    /// Echo messages back instead of calling the model.
    #[serde(default)]
    pub test_mode: bool,
}

fn default_gateway_port() -> u16 {
    8000
}

fn default_gateway_host() -> String {
    "127.0.0.1".into()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_latency_window() -> usize {
    200
}

fn default_gateway_user_id() -> String {
    "default_user".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            host: default_gateway_host(),
            request_timeout_secs: default_request_timeout_secs(),
            latency_window: default_latency_window(),
            default_user_id: default_gateway_user_id(),
            test_mode: false,
        }
    }
}

// ── Google Cloud ─────────────────────────────────────────────────

/// Google Cloud configuration (`[gcp]` section).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GcpConfig {
    pub project_id: Option<String>,
    /// Region used for regional endpoints (e.g. `"europe-west4"`).
    pub location: Option<String>,
    /// Pub/Sub regional endpoint override; falls back to `location`.
    pub pubsub_region: Option<String>,
    /// Vertex AI Search (Discovery Engine) data store id.
    pub search_data_store_id: Option<String>,
    /// Static OAuth access token. When unset the metadata server is used.
    pub access_token: Option<String>,
}

impl GcpConfig {
    pub fn search_location(&self) -> &str {
        self.location
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or("europe-west4")
    }

    pub fn effective_pubsub_region(&self) -> Option<&str> {
        self.pubsub_region
            .as_deref()
            .or(self.location.as_deref())
            .filter(|r| !r.trim().is_empty())
    }
}

// ── Telegram ─────────────────────────────────────────────────────

/// Telegram bridge configuration (`[telegram]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    /// Secret Manager id holding the bot token, used when `bot_token` is unset.
    pub bot_token_secret_id: Option<String>,
    /// Base URL of the chat gateway the bridge forwards to.
    #[serde(default = "default_agent_api_url")]
    pub agent_api_url: String,
    #[serde(default = "default_telegram_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_agent_api_url() -> String {
    "http://localhost:8000".into()
}

fn default_telegram_timeout_secs() -> u64 {
    30
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            bot_token_secret_id: None,
            agent_api_url: default_agent_api_url(),
            request_timeout_secs: default_telegram_timeout_secs(),
        }
    }
}

// ── Observability ─────────────────────────────────────────────────

/// Logging configuration (`[observability]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// "text" | "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

// ── Config impl ──────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        let home =
            UserDirs::new().map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf());

        Self {
            config_path: home.join(".agentwatch").join("config.toml"),
            api_key: None,
            api_url: None,
            default_provider: Some("gemini".to_string()),
            default_model: Some("gemini-2.0-flash".to_string()),
            default_temperature: 0.7,
            agent: AgentConfig::default(),
            delegation: DelegationConfig::default(),
            monitor: MonitorConfig::default(),
            gateway: GatewayConfig::default(),
            gcp: GcpConfig::default(),
            telegram: TelegramConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

fn default_config_dir() -> Result<PathBuf> {
    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("Could not find home directory")?;
    Ok(home.join(".agentwatch"))
}

fn resolve_config_dir() -> Result<PathBuf> {
    if let Ok(custom) = std::env::var(CONFIG_DIR_ENV) {
        let custom = custom.trim();
        if !custom.is_empty() {
            return Ok(PathBuf::from(shellexpand::tilde(custom).as_ref()));
        }
    }
    default_config_dir()
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn first_env(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| non_empty_env(name))
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    pub async fn load_or_init() -> Result<Self> {
        let config_dir = resolve_config_dir()?;
        Self::load_or_init_in(&config_dir).await
    }

    /// Load `config.toml` from `config_dir`, writing defaults on first run.
    pub async fn load_or_init_in(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join("config.toml");

        fs::create_dir_all(config_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let initialized = !config_path.exists();
        let mut config = if initialized {
            let mut config = Config::default();
            config.config_path = config_path.clone();
            config.save().await?;

            // Restrict permissions on newly created config file (may contain API keys)
            #[cfg(unix)]
            {
                use std::{fs::Permissions, os::unix::fs::PermissionsExt};
                let _ = fs::set_permissions(&config_path, Permissions::from_mode(0o600)).await;
            }
            config
        } else {
            let contents = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = config_path.clone();
            config
        };

        config.apply_env_overrides();
        config.validate()?;
        if initialized {
            tracing::info!(path = %config.config_path.display(), "Wrote default config");
        }
        Ok(config)
    }

    /// Warn if the config file is world-readable (it may contain API keys).
    pub async fn warn_if_world_readable(&self) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(meta) = fs::metadata(&self.config_path).await {
                if meta.permissions().mode() & 0o004 != 0 {
                    tracing::warn!(
                        "Config file {:?} is world-readable (mode {:o}). \
                         Consider restricting with: chmod 600 {:?}",
                        self.config_path,
                        meta.permissions().mode() & 0o777,
                        self.config_path,
                    );
                }
            }
        }
    }

    /// Validate configuration values that would cause runtime failures.
    pub fn validate(&self) -> Result<()> {
        if self.gateway.host.trim().is_empty() {
            anyhow::bail!("gateway.host must not be empty");
        }
        if self.gateway.latency_window == 0 {
            anyhow::bail!("gateway.latency_window must be greater than 0");
        }
        if self.monitor.max_events == 0 {
            anyhow::bail!("monitor.max_events must be greater than 0");
        }
        if self.delegation.timeout_secs == 0 {
            anyhow::bail!("delegation.timeout_secs must be greater than 0");
        }
        if self.agent.name.trim().is_empty() {
            anyhow::bail!("agent.name must not be empty");
        }
        if !(0.0..=2.0).contains(&self.default_temperature) {
            anyhow::bail!(
                "default_temperature must be between 0.0 and 2.0 (got {})",
                self.default_temperature
            );
        }
        match self.observability.log_format.as_str() {
            "text" | "json" => {}
            other => anyhow::bail!("observability.log_format must be \"text\" or \"json\" (got {other:?})"),
        }
        Ok(())
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        // API Key: AGENTWATCH_API_KEY or API_KEY (generic)
        if let Some(key) = first_env(&["AGENTWATCH_API_KEY", "API_KEY"]) {
            self.api_key = Some(key);
        }

        if let Some(provider) = non_empty_env("AGENTWATCH_PROVIDER") {
            self.default_provider = Some(provider);
        }

        // Model: AGENTWATCH_MODEL or MODEL
        if let Some(model) = first_env(&["AGENTWATCH_MODEL", "MODEL"]) {
            self.default_model = Some(model);
        }

        // Gateway port: AGENTWATCH_GATEWAY_PORT or PORT (Cloud Run sets PORT)
        if let Some(port) = first_env(&["AGENTWATCH_GATEWAY_PORT", "PORT"]) {
            if let Ok(port) = port.parse::<u16>() {
                self.gateway.port = port;
            }
        }

        // Gateway host: AGENTWATCH_GATEWAY_HOST or HOST
        if let Some(host) = first_env(&["AGENTWATCH_GATEWAY_HOST", "HOST"]) {
            self.gateway.host = host;
        }

        if let Some(flag) = non_empty_env("AGENTWATCH_TEST_MODE").as_deref().and_then(parse_flag) {
            self.gateway.test_mode = flag;
        }

        // Temperature: AGENTWATCH_TEMPERATURE
        if let Some(temp) = non_empty_env("AGENTWATCH_TEMPERATURE") {
            if let Ok(temp) = temp.parse::<f64>() {
                if (0.0..=2.0).contains(&temp) {
                    self.default_temperature = temp;
                }
            }
        }

        // Google Cloud
        if let Some(project) = non_empty_env("GCP_PROJECT_ID") {
            self.gcp.project_id = Some(project);
        }
        if let Some(location) = non_empty_env("GCP_LOCATION") {
            self.gcp.location = Some(location);
        }
        if let Some(region) = non_empty_env("PUBSUB_REGION") {
            self.gcp.pubsub_region = Some(region);
        }
        if let Some(store) = non_empty_env("VERTEX_SEARCH_DATA_STORE_ID") {
            self.gcp.search_data_store_id = Some(store);
        }
        if let Some(token) = non_empty_env("GOOGLE_OAUTH_ACCESS_TOKEN") {
            self.gcp.access_token = Some(token);
        }

        // Telegram bridge
        if let Some(token) = non_empty_env("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(token);
        }
        if let Some(secret_id) = non_empty_env("TELEGRAM_BOT_TOKEN_SECRET_ID") {
            self.telegram.bot_token_secret_id = Some(secret_id);
        }
        if let Some(url) = non_empty_env("AGENT_API_URL") {
            self.telegram.agent_api_url = url;
        }

        if let Some(format) = non_empty_env("AGENTWATCH_LOG_FORMAT") {
            self.observability.log_format = format.to_ascii_lowercase();
        }
    }

    pub fn model(&self) -> &str {
        self.default_model.as_deref().unwrap_or("gemini-2.0-flash")
    }

    pub fn provider(&self) -> &str {
        self.default_provider.as_deref().unwrap_or("gemini")
    }

    pub async fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let parent_dir = self
            .config_path
            .parent()
            .context("Config path must have a parent directory")?;

        fs::create_dir_all(parent_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                parent_dir.display()
            )
        })?;

        let file_name = self
            .config_path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or("config.toml");
        let temp_path = parent_dir.join(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()));
        let backup_path = parent_dir.join(format!("{file_name}.bak"));

        let mut temp_file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to create temporary config file: {}",
                    temp_path.display()
                )
            })?;
        temp_file
            .write_all(toml_str.as_bytes())
            .await
            .context("Failed to write temporary config contents")?;
        temp_file
            .sync_all()
            .await
            .context("Failed to fsync temporary config file")?;
        drop(temp_file);

        let had_existing_config = self.config_path.exists();
        if had_existing_config {
            fs::copy(&self.config_path, &backup_path)
                .await
                .with_context(|| {
                    format!(
                        "Failed to create config backup before atomic replace: {}",
                        backup_path.display()
                    )
                })?;
        }

        if let Err(e) = fs::rename(&temp_path, &self.config_path).await {
            let _ = fs::remove_file(&temp_path).await;
            if had_existing_config && backup_path.exists() {
                fs::copy(&backup_path, &self.config_path)
                    .await
                    .context("Failed to restore config backup")?;
            }
            anyhow::bail!("Failed to atomically replace config file: {e}");
        }

        sync_directory(parent_dir).await?;

        if had_existing_config {
            let _ = fs::remove_file(&backup_path).await;
        }

        Ok(())
    }
}

async fn sync_directory(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let dir = File::open(path)
            .await
            .with_context(|| format!("Failed to open directory for fsync: {}", path.display()))?;
        dir.sync_all()
            .await
            .with_context(|| format!("Failed to fsync directory metadata: {}", path.display()))?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::{Mutex, MutexGuard};
    use tokio::test;

    // ── Defaults ─────────────────────────────────────────────

    #[test]
    async fn config_default_has_sane_values() {
        let c = Config::default();
        assert_eq!(c.default_provider.as_deref(), Some("gemini"));
        assert!(c.model().contains("gemini"));
        assert!((c.default_temperature - 0.7).abs() < f64::EPSILON);
        assert!(c.api_key.is_none());
        assert!(c.config_path.to_string_lossy().contains("config.toml"));
        assert!(c.validate().is_ok());
    }

    #[test]
    async fn monitor_and_gateway_defaults() {
        let c = Config::default();
        assert_eq!(c.monitor.max_events, 50);
        assert_eq!(c.monitor.max_sessions, 0);
        assert_eq!(c.monitor.detail_events, 10);
        assert_eq!(c.gateway.port, 8000);
        assert_eq!(c.gateway.latency_window, 200);
        assert_eq!(c.gateway.default_user_id, "default_user");
        assert!(!c.gateway.test_mode);
        assert_eq!(c.delegation.timeout_secs, 30);
        assert_eq!(c.delegation.default_user_id, "main_agent");
    }

    #[test]
    async fn config_minimal_toml_uses_defaults() {
        let minimal = r#"
default_temperature = 0.3
"#;
        let parsed: Config = toml::from_str(minimal).unwrap();
        assert!(parsed.api_key.is_none());
        assert!(parsed.default_provider.is_none());
        assert_eq!(parsed.provider(), "gemini");
        assert_eq!(parsed.agent.max_tool_iterations, 10);
        assert_eq!(parsed.monitor.max_events, 50);
        assert_eq!(parsed.telegram.agent_api_url, "http://localhost:8000");
    }

    #[test]
    async fn monitor_section_deserializes() {
        let raw = r#"
default_temperature = 0.7

[monitor]
max_events = 5
max_sessions = 100
"#;
        let parsed: Config = toml::from_str(raw).unwrap();
        assert_eq!(parsed.monitor.max_events, 5);
        assert_eq!(parsed.monitor.max_sessions, 100);
        assert_eq!(parsed.monitor.detail_events, 10);
    }

    #[test]
    async fn validate_rejects_zero_bounds() {
        let mut c = Config::default();
        c.monitor.max_events = 0;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.gateway.latency_window = 0;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.delegation.timeout_secs = 0;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.observability.log_format = "xml".into();
        assert!(c.validate().is_err());
    }

    #[test]
    async fn gcp_location_helpers() {
        let mut gcp = GcpConfig::default();
        assert_eq!(gcp.search_location(), "europe-west4");
        assert!(gcp.effective_pubsub_region().is_none());

        gcp.location = Some("us-central1".into());
        assert_eq!(gcp.search_location(), "us-central1");
        assert_eq!(gcp.effective_pubsub_region(), Some("us-central1"));

        gcp.pubsub_region = Some("europe-west1".into());
        assert_eq!(gcp.effective_pubsub_region(), Some("europe-west1"));
    }

    // ── Save / load ──────────────────────────────────────────

    #[test]
    async fn config_save_and_load_tmpdir() {
        let _env_guard = env_override_lock().await;
        let dir = tempfile::tempdir().unwrap();

        let mut config = Config::default();
        config.config_path = dir.path().join("config.toml");
        config.default_model = Some("test-model".into());
        config.default_temperature = 0.9;
        config.monitor.max_events = 7;
        config.save().await.unwrap();
        assert!(config.config_path.exists());

        let loaded = Config::load_or_init_in(dir.path()).await.unwrap();
        assert_eq!(loaded.monitor.max_events, 7);
        assert!((loaded.default_temperature - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    async fn load_or_init_writes_defaults_on_first_run() {
        let _env_guard = env_override_lock().await;
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("fresh");

        let config = Config::load_or_init_in(&nested).await.unwrap();
        assert!(nested.join("config.toml").exists());
        assert_eq!(config.agent.name, "gemini_agent");
    }

    #[test]
    async fn config_save_atomic_replaces_cleanly() {
        let dir = tempfile::tempdir().unwrap();

        let mut config = Config::default();
        config.config_path = dir.path().join("config.toml");
        config.default_model = Some("model-a".into());
        config.save().await.unwrap();

        config.default_model = Some("model-b".into());
        config.save().await.unwrap();

        let contents = tokio::fs::read_to_string(&config.config_path).await.unwrap();
        assert!(contents.contains("model-b"));

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert!(!names.iter().any(|name| name.contains(".tmp-")));
        assert!(!names.iter().any(|name| name.ends_with(".bak")));
    }

    // ── Env override helpers ─────────────────────────────────

    async fn env_override_lock() -> MutexGuard<'static, ()> {
        static ENV_OVERRIDE_TEST_LOCK: Mutex<()> = Mutex::const_new(());
        ENV_OVERRIDE_TEST_LOCK.lock().await
    }

    // ── Env override tests ───────────────────────────────────

    #[test]
    async fn env_override_api_key() {
        let _env_guard = env_override_lock().await;
        let mut config = Config::default();

        std::env::set_var("AGENTWATCH_API_KEY", "sk-test-env-key");
        config.apply_env_overrides();
        assert_eq!(config.api_key.as_deref(), Some("sk-test-env-key"));

        std::env::remove_var("AGENTWATCH_API_KEY");
    }

    #[test]
    async fn env_override_port_and_test_mode() {
        let _env_guard = env_override_lock().await;
        let mut config = Config::default();

        std::env::set_var("AGENTWATCH_GATEWAY_PORT", "9090");
        std::env::set_var("AGENTWATCH_TEST_MODE", "TRUE");
        config.apply_env_overrides();
        assert_eq!(config.gateway.port, 9090);
        assert!(config.gateway.test_mode);

        std::env::remove_var("AGENTWATCH_GATEWAY_PORT");
        std::env::remove_var("AGENTWATCH_TEST_MODE");
    }

    #[test]
    async fn env_override_invalid_port_is_ignored() {
        let _env_guard = env_override_lock().await;
        let mut config = Config::default();

        std::env::set_var("AGENTWATCH_GATEWAY_PORT", "not-a-port");
        config.apply_env_overrides();
        assert_eq!(config.gateway.port, 8000);

        std::env::remove_var("AGENTWATCH_GATEWAY_PORT");
    }

    #[test]
    async fn env_override_gcp_settings() {
        let _env_guard = env_override_lock().await;
        let mut config = Config::default();

        std::env::set_var("GCP_PROJECT_ID", "proj-1");
        std::env::set_var("VERTEX_SEARCH_DATA_STORE_ID", "store-9");
        config.apply_env_overrides();
        assert_eq!(config.gcp.project_id.as_deref(), Some("proj-1"));
        assert_eq!(config.gcp.search_data_store_id.as_deref(), Some("store-9"));

        std::env::remove_var("GCP_PROJECT_ID");
        std::env::remove_var("VERTEX_SEARCH_DATA_STORE_ID");
    }

    #[test]
    async fn parse_flag_accepts_common_spellings() {
        assert_eq!(parse_flag("yes"), Some(true));
        assert_eq!(parse_flag(" Off "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
