//! HTTP gateway: chat endpoint, health/stats/metrics probes, session reports,
//! and the bundled dashboard.

pub mod api;
pub mod stats;

pub use stats::{ChatStats, StatsSnapshot};

use crate::agent::{self, AgentDeps, AgentRunner};
use crate::cloud::GcpClient;
use crate::config::Config;
use crate::monitor::SessionMonitor;
use crate::observability::GatewayMetrics;
use crate::providers;
use crate::sessions;
use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;

/// Request bodies above this size are rejected with 413.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Slack given to the router-wide timeout on top of `request_timeout`.
const TIMEOUT_GRACE: Duration = Duration::from_secs(10);

/// Shared handler state. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<dyn AgentRunner>,
    pub monitor: Arc<SessionMonitor>,
    pub stats: Arc<ChatStats>,
    pub metrics: Arc<GatewayMetrics>,
    pub started: Instant,
    pub test_mode: bool,
    pub user_id: String,
    pub agent_name: String,
    pub model: String,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(
        config: &Config,
        agent: Arc<dyn AgentRunner>,
        monitor: Arc<SessionMonitor>,
    ) -> Result<Self> {
        let metrics = GatewayMetrics::new().context("Failed to register gateway metrics")?;
        Ok(Self {
            agent_name: agent.name().to_string(),
            model: agent.model().to_string(),
            agent,
            monitor,
            stats: Arc::new(ChatStats::new(config.gateway.latency_window)),
            metrics: Arc::new(metrics),
            started: Instant::now(),
            test_mode: config.gateway.test_mode,
            user_id: config.gateway.default_user_id.clone(),
            request_timeout: Duration::from_secs(config.gateway.request_timeout_secs),
        })
    }
}

/// Build the router with every route and layer attached.
pub fn build_router(state: AppState) -> Router {
    // Chat turns enforce `request_timeout` themselves; this only catches
    // handlers that hang past it.
    let timeout = state.request_timeout + TIMEOUT_GRACE;

    Router::new()
        .route("/", get(api::handle_index))
        .route("/static/script.js", get(api::handle_script))
        .route("/health", get(api::handle_health))
        .route("/stats", get(api::handle_stats))
        .route("/metrics", get(api::handle_metrics))
        .route("/api/chat", post(api::handle_chat))
        .route("/api/sessions", get(api::handle_sessions))
        .route("/api/sessions/{id}", get(api::handle_session_details))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            count_server_errors,
        ))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Count every 5xx response into the error counter.
async fn count_server_errors(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    if response.status().is_server_error() {
        state.stats.record_error();
        state.metrics.chat_errors.inc();
    }
    response
}

/// Wire the provider, stores and agents from `config` and serve until ctrl-c.
pub async fn run_gateway(host: &str, port: u16, config: Config) -> Result<()> {
    let provider = providers::create_provider_with_url(
        config.provider(),
        config.api_key.as_deref(),
        config.api_url.as_deref(),
    )?;
    let monitor = Arc::new(SessionMonitor::from_config(&config.monitor));
    let deps = AgentDeps {
        provider: Arc::from(provider),
        store: sessions::create_conversation_store(),
        gcp: Arc::new(GcpClient::from_config(&config.gcp)),
        monitor: Arc::clone(&monitor),
    };
    let root = agent::build_agents(&config, &deps);
    let state = AppState::new(&config, root, monitor)?;

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind gateway to {addr}"))?;

    tracing::info!(
        addr = %addr,
        agent = %state.agent_name,
        model = %state.model,
        test_mode = state.test_mode,
        "Gateway listening"
    );
    if state.test_mode {
        tracing::warn!("Test mode is on: chat requests are echoed without calling the model");
    }

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Gateway server error")?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}
