//! Prometheus metrics exported by the gateway at `/metrics`.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Gateway metric handles plus the registry that owns them.
pub struct GatewayMetrics {
    registry: Registry,
    pub chat_requests: IntCounter,
    pub chat_errors: IntCounter,
    pub chat_latency: Histogram,
    pub tool_calls: IntCounterVec,
    pub active_sessions: IntGauge,
}

impl GatewayMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let chat_requests = IntCounter::new(
            "agentwatch_chat_requests_total",
            "Chat requests received",
        )?;
        let chat_errors = IntCounter::new(
            "agentwatch_chat_errors_total",
            "Chat requests that failed or returned a server error",
        )?;
        let chat_latency = Histogram::with_opts(
            HistogramOpts::new(
                "agentwatch_chat_latency_seconds",
                "Agent invocation wall-clock time",
            )
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        )?;
        let tool_calls = IntCounterVec::new(
            Opts::new("agentwatch_tool_calls_total", "Tool invocations by tool name"),
            &["tool"],
        )?;
        let active_sessions = IntGauge::new(
            "agentwatch_active_sessions",
            "Sessions tracked by the session monitor",
        )?;

        registry.register(Box::new(chat_requests.clone()))?;
        registry.register(Box::new(chat_errors.clone()))?;
        registry.register(Box::new(chat_latency.clone()))?;
        registry.register(Box::new(tool_calls.clone()))?;
        registry.register(Box::new(active_sessions.clone()))?;

        Ok(Self {
            registry,
            chat_requests,
            chat_errors,
            chat_latency,
            tool_calls,
            active_sessions,
        })
    }

    pub fn record_tool_call(&self, tool: &str) {
        self.tool_calls.with_label_values(&[tool]).inc();
    }

    /// Text exposition format.
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
