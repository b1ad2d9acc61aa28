//! Telegram bridge: long-polls the Bot API and forwards text to the gateway's
//! `/api/chat` endpoint, one gateway session per Telegram user.

use crate::cloud::{self, GcpClient};
use crate::config::Config;
use anyhow::{Context, Result};
use reqwest::StatusCode;
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

pub const GREETING: &str = "Hi! Send me a message and I'll ask the agent.";
pub const CHAT_USAGE: &str = "Usage: /chat <message for the agent>";
pub const NO_RESPONSE: &str = "(no response)";
pub const UNREACHABLE: &str = "Sorry, I could not reach the agent.";
pub const TOKEN_FILE: &str = ".telegram_bot";

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const POLL_TIMEOUT_SECS: u64 = 30;
const POLL_RETRY_SECS: u64 = 5;
const CONFLICT_RETRY_SECS: u64 = 35;
const DEFAULT_RATE_LIMIT_RETRY_SECS: u64 = 5;
const MAX_RATE_LIMIT_RETRY_SECS: u64 = 120;
/// Telegram rejects messages longer than this many UTF-16 units; counting
/// chars keeps us under it for all but astral-plane text.
const MAX_MESSAGE_CHARS: usize = 4000;

/// `<bot id>:<secret>` as issued by BotFather.
static TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d+:[A-Za-z0-9_-]+").unwrap_or_else(|e| panic!("invalid token pattern: {e}"))
});

/// A text message pulled out of an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub update_id: i64,
    pub chat_id: i64,
    pub user_id: i64,
    pub text: String,
}

impl IncomingMessage {
    /// Gateway session id for this sender.
    pub fn session_id(&self) -> String {
        format!("tg_{}", self.user_id)
    }
}

/// What to do with an incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action<'a> {
    Greet,
    Usage,
    Forward(&'a str),
    Ignore,
}

/// Route `/start`, `/chat <text>` and plain text; other commands are ignored.
pub fn classify(text: &str) -> Action<'_> {
    let text = text.trim();
    if text.is_empty() {
        return Action::Ignore;
    }
    if !text.starts_with('/') {
        return Action::Forward(text);
    }

    let (head, rest) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
    // `/start@my_bot` is how commands arrive in group chats.
    let command = head.split('@').next().unwrap_or(head);
    match command {
        "/start" => Action::Greet,
        "/chat" => match rest.trim() {
            "" => Action::Usage,
            prompt => Action::Forward(prompt),
        },
        _ => Action::Ignore,
    }
}

pub fn parse_update(update: &Value) -> Option<IncomingMessage> {
    let update_id = update.get("update_id")?.as_i64()?;
    let message = update.get("message")?;
    let text = message.get("text")?.as_str()?;
    let chat_id = message.get("chat")?.get("id")?.as_i64()?;
    let user_id = message
        .get("from")
        .and_then(|from| from.get("id"))
        .and_then(Value::as_i64)
        .unwrap_or(chat_id);
    Some(IncomingMessage {
        update_id,
        chat_id,
        user_id,
        text: text.to_string(),
    })
}

/// Pull the `response` field out of a gateway reply.
pub fn reply_from_body(body: &Value) -> String {
    body.get("response")
        .and_then(Value::as_str)
        .map_or_else(|| NO_RESPONSE.to_string(), str::to_string)
}

/// `parameters.retry_after` from a Bot API error payload.
pub fn retry_after_secs(data: &Value) -> Option<u64> {
    data.get("parameters")?.get("retry_after")?.as_u64()
}

/// Split `text` into chunks Telegram will accept, preferring line breaks.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > max_chars {
            for ch in line.chars() {
                if current_len == max_chars {
                    chunks.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                current.push(ch);
                current_len += 1;
            }
        } else {
            current.push_str(line);
            current_len += line_len;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Pull a bot token out of raw env or file content.
///
/// Accepts `TELEGRAM_BOT_TOKEN=`/`BOT_TOKEN=`/`TOKEN=` assignments, a bare
/// `<digits>:<secret>` token anywhere in the text, or the first non-empty
/// line (its value after `=` when it is an assignment).
pub fn extract_token(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    for marker in ["TELEGRAM_BOT_TOKEN=", "BOT_TOKEN=", "TOKEN="] {
        if let Some((_, rest)) = raw.split_once(marker) {
            let value = rest.lines().next().unwrap_or("").trim();
            let value = value.trim_matches(|c| c == '"' || c == '\'');
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }

    if let Some(found) = TOKEN_PATTERN.find(raw) {
        return Some(found.as_str().to_string());
    }

    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let value = line.split_once('=').map_or(line, |(_, v)| v.trim());
    (!value.is_empty()).then(|| value.to_string())
}

/// Token from config/env, then Secret Manager, then the token file.
pub async fn resolve_token(config: &Config, gcp: &GcpClient, token_file: &Path) -> Result<String> {
    let configured = config
        .telegram
        .bot_token
        .as_deref()
        .and_then(extract_token);
    if let Some(token) = configured {
        return Ok(token);
    }

    match cloud::resolve_secret(gcp, None, config.telegram.bot_token_secret_id.as_deref()).await {
        Ok(Some(secret)) => {
            if let Some(token) = extract_token(&secret) {
                return Ok(token);
            }
        }
        Ok(None) => {}
        Err(e) => tracing::warn!("Failed to load Telegram token from Secret Manager: {e}"),
    }

    if let Ok(contents) = tokio::fs::read_to_string(token_file).await {
        if let Some(token) = extract_token(&contents) {
            return Ok(token);
        }
    }

    anyhow::bail!("Telegram bot token not found. Set TELEGRAM_BOT_TOKEN or create .telegram_bot")
}

/// Bot API poller plus gateway client.
pub struct TelegramBridge {
    token: String,
    api_base: String,
    agent_api_url: String,
    request_timeout: Duration,
    client: reqwest::Client,
}

impl TelegramBridge {
    pub fn new(token: &str, agent_api_url: &str, request_timeout: Duration) -> Self {
        Self {
            token: token.to_string(),
            api_base: TELEGRAM_API_BASE.to_string(),
            agent_api_url: agent_api_url.trim_end_matches('/').to_string(),
            request_timeout,
            client: reqwest::Client::new(),
        }
    }

    /// Point at a different Bot API host.
    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.token)
    }

    /// Send `message` to the gateway and return the reply text. Never fails:
    /// transport and HTTP errors become [`UNREACHABLE`].
    pub async fn ask_agent(&self, message: &str, session_id: &str) -> String {
        let started = Instant::now();
        let result = self
            .client
            .post(format!("{}/api/chat", self.agent_api_url))
            .timeout(self.request_timeout)
            .json(&serde_json::json!({ "message": message, "session_id": session_id }))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(session_id, "Error talking to agent: {e}");
                return UNREACHABLE.to_string();
            }
        };

        let status = response.status().as_u16();
        let trace_id = response
            .headers()
            .get("x-trace-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        match response.json::<Value>().await {
            Ok(body) => {
                tracing::info!(
                    session_id,
                    latency_ms = started.elapsed().as_secs_f64() * 1000.0,
                    trace_id = %trace_id,
                    status,
                    "agent_call"
                );
                reply_from_body(&body)
            }
            Err(e) => {
                tracing::error!(session_id, "Error decoding agent reply: {e}");
                UNREACHABLE.to_string()
            }
        }
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            let response = self
                .client
                .post(self.api_url("sendMessage"))
                .json(&serde_json::json!({ "chat_id": chat_id, "text": chunk }))
                .send()
                .await
                .context("Telegram sendMessage request failed")?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!("Telegram sendMessage failed ({status}): {body}");
            }
        }
        Ok(())
    }

    /// Reply to one message. Returns the text sent, if any.
    pub async fn handle_message(&self, message: &IncomingMessage) -> Option<String> {
        let reply = match classify(&message.text) {
            Action::Ignore => return None,
            Action::Greet => GREETING.to_string(),
            Action::Usage => CHAT_USAGE.to_string(),
            Action::Forward(prompt) => self.ask_agent(prompt, &message.session_id()).await,
        };

        if let Err(e) = self.send_message(message.chat_id, &reply).await {
            tracing::warn!(chat_id = message.chat_id, "Failed to deliver reply: {e}");
        }
        Some(reply)
    }

    /// Poll `getUpdates` until a fatal auth error.
    pub async fn listen(&self) -> Result<()> {
        let mut offset: i64 = 0;
        tracing::info!(agent_api_url = %self.agent_api_url, "Telegram bridge polling for messages");

        loop {
            let body = serde_json::json!({
                "offset": offset,
                "timeout": POLL_TIMEOUT_SECS,
                "allowed_updates": ["message"],
            });
            let response = match self
                .client
                .post(self.api_url("getUpdates"))
                .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("Telegram poll error: {e}");
                    sleep_secs(POLL_RETRY_SECS).await;
                    continue;
                }
            };

            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            let data = serde_json::from_str::<Value>(&text).ok();

            if !status.is_success() {
                let description = data
                    .as_ref()
                    .and_then(|d| d.get("description"))
                    .and_then(Value::as_str)
                    .unwrap_or(text.as_str());
                match status {
                    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                        anyhow::bail!("Telegram getUpdates rejected the bot token ({status}): {description}");
                    }
                    StatusCode::CONFLICT => {
                        tracing::warn!(
                            "Telegram polling conflict (409): {description}. \
                             Ensure only one process is using this bot token."
                        );
                        sleep_secs(CONFLICT_RETRY_SECS).await;
                    }
                    StatusCode::TOO_MANY_REQUESTS => {
                        let retry = data
                            .as_ref()
                            .and_then(retry_after_secs)
                            .unwrap_or(DEFAULT_RATE_LIMIT_RETRY_SECS)
                            .clamp(1, MAX_RATE_LIMIT_RETRY_SECS);
                        tracing::warn!(retry_after_secs = retry, "Telegram rate limited: {description}");
                        sleep_secs(retry).await;
                    }
                    _ => {
                        tracing::warn!(status = %status, "Telegram getUpdates error: {description}");
                        sleep_secs(POLL_RETRY_SECS).await;
                    }
                }
                continue;
            }

            let Some(data) = data else {
                tracing::warn!("Telegram getUpdates returned invalid JSON");
                sleep_secs(POLL_RETRY_SECS).await;
                continue;
            };

            let updates = data
                .get("result")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for update in &updates {
                if let Some(id) = update.get("update_id").and_then(Value::as_i64) {
                    offset = offset.max(id + 1);
                }
                if let Some(message) = parse_update(update) {
                    self.handle_message(&message).await;
                }
            }
        }
    }
}

async fn sleep_secs(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

/// Resolve the token and run the bridge until a fatal error.
pub async fn run_telegram(config: Config) -> Result<()> {
    let gcp = GcpClient::from_config(&config.gcp);
    let token = resolve_token(&config, &gcp, Path::new(TOKEN_FILE)).await?;
    let bridge = TelegramBridge::new(
        &token,
        &config.telegram.agent_api_url,
        Duration::from_secs(config.telegram.request_timeout_secs),
    );
    bridge.listen().await
}
