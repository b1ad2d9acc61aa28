//! Route handlers for the gateway.

use super::AppState;
use crate::agent::{AgentInput, RunObserver};
use crate::tools::ToolResult;
use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Json, Response},
};
use serde::Deserialize;
use std::time::Instant;

/// Reply sent when the agent fails; details stay in the logs.
pub const APOLOGY: &str = "I'm sorry, I encountered an error processing your request.";

/// Header carrying the per-request trace id on chat responses.
pub const TRACE_HEADER: &str = "x-trace-id";

const INDEX_HTML: &str = include_str!("../../static/index.html");
const SCRIPT_JS: &str = include_str!("../../static/script.js");

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub message: String,
    pub session_id: String,
}

/// Feeds tool invocations reported by the agent runtime into `/stats` and
/// `/metrics`.
struct StatsObserver<'a> {
    state: &'a AppState,
    trace_id: &'a str,
    session_id: &'a str,
}

impl RunObserver for StatsObserver<'_> {
    fn on_tool_call(&self, tool_name: &str) {
        self.state.stats.record_tool_call(tool_name);
        self.state.metrics.record_tool_call(tool_name);
        tracing::info!(
            trace_id = self.trace_id,
            session_id = self.session_id,
            user_id = %self.state.user_id,
            tool = tool_name,
            "tool_call"
        );
    }
}

/// GET / (dashboard page)
pub async fn handle_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /static/script.js
pub async fn handle_script() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        SCRIPT_JS,
    )
}

/// GET /health
pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "uptime_seconds": state.started.elapsed().as_secs_f64(),
        "timestamp": unix_timestamp(),
    }))
}

/// GET /stats
pub async fn handle_stats(State(state): State<AppState>) -> impl IntoResponse {
    let snap = state.stats.snapshot();
    Json(serde_json::json!({
        "request_count": snap.request_count,
        "error_count": snap.error_count,
        "uptime_seconds": state.started.elapsed().as_secs_f64(),
        "agent_name": state.agent_name,
        "model": state.model,
        "latency_avg_ms": snap.latency_avg_ms,
        "latency_p95_ms": snap.latency_p95_ms,
        "tool_calls_total": snap.tool_calls_total,
        "tool_calls_by_name": snap.tool_calls_by_name,
    }))
}

/// GET /metrics in Prometheus text format
pub async fn handle_metrics(State(state): State<AppState>) -> Response {
    refresh_session_gauge(&state);
    match state.metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// GET /api/sessions: summary report for every tracked session
pub async fn handle_sessions(State(state): State<AppState>) -> impl IntoResponse {
    Json(ToolResult::success(state.monitor.get_summary()))
}

/// GET /api/sessions/{id}: detail report for one session
pub async fn handle_session_details(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    Json(ToolResult::success(state.monitor.get_details(&session_id)))
}

/// POST /api/chat
pub async fn handle_chat(State(state): State<AppState>, Json(body): Json<ChatBody>) -> Response {
    state.stats.record_request();
    state.metrics.chat_requests.inc();

    let trace_id = uuid::Uuid::new_v4().to_string();
    let session_id = body.session_id.as_str();
    let user_id = state.user_id.as_str();
    let agent_name = state.agent_name.as_str();

    state.monitor.log_event(
        session_id,
        user_id,
        agent_name,
        "message_received",
        Some("User message received"),
        None,
    );
    state.monitor.record_message(session_id, user_id, agent_name);
    refresh_session_gauge(&state);

    tracing::info!(
        trace_id = %trace_id,
        session_id,
        user_id,
        agent_name,
        "chat_request"
    );

    if state.test_mode {
        let reply = format!("[test-mode] {}", body.message);
        return with_trace_id(&trace_id, Json(serde_json::json!({ "response": reply })));
    }

    let observer = StatsObserver {
        state: &state,
        trace_id: &trace_id,
        session_id,
    };
    let input = AgentInput::new(&body.message, session_id, user_id);
    let started = Instant::now();

    let outcome = match tokio::time::timeout(state.request_timeout, state.agent.run(&input, &observer))
        .await
    {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "agent run timed out after {}s",
            state.request_timeout.as_secs()
        )),
    };

    match outcome {
        Ok(output) => {
            let elapsed = started.elapsed();
            let latency_ms = elapsed.as_secs_f64() * 1000.0;
            state.stats.record_latency_ms(latency_ms);
            state.metrics.chat_latency.observe(elapsed.as_secs_f64());

            state.monitor.log_event(
                session_id,
                user_id,
                agent_name,
                "completed",
                Some("Chat response generated"),
                None,
            );
            tracing::info!(
                trace_id = %trace_id,
                session_id,
                user_id,
                latency_ms,
                tool_calls = output.tool_calls_made,
                "chat_response"
            );

            // Alerts are surfaced through the reporting tools only.
            let _ = state.monitor.pop_alerts(session_id);

            with_trace_id(
                &trace_id,
                Json(serde_json::json!({ "response": output.response })),
            )
        }
        Err(e) => {
            let error = format!("{e:#}");
            state.stats.record_error();
            state.metrics.chat_errors.inc();
            state.monitor.log_event(
                session_id,
                user_id,
                agent_name,
                "error",
                None,
                Some(&error),
            );
            tracing::error!(
                trace_id = %trace_id,
                session_id,
                user_id,
                message = %body.message,
                error = %error,
                "chat_error"
            );
            with_trace_id(&trace_id, Json(serde_json::json!({ "response": APOLOGY })))
        }
    }
}

fn with_trace_id(trace_id: &str, body: impl IntoResponse) -> Response {
    let mut response = body.into_response();
    if let Ok(value) = HeaderValue::from_str(trace_id) {
        response.headers_mut().insert(TRACE_HEADER, value);
    }
    response
}

fn refresh_session_gauge(state: &AppState) {
    let sessions = i64::try_from(state.monitor.len()).unwrap_or(i64::MAX);
    state.metrics.active_sessions.set(sessions);
}

fn unix_timestamp() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1_000_000.0
}
