//! Request, error, latency and tool-call counters behind `/stats`.

use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};

/// Point-in-time copy of [`ChatStats`].
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub request_count: u64,
    pub error_count: u64,
    pub latency_avg_ms: f64,
    pub latency_p95_ms: f64,
    pub tool_calls_total: u64,
    pub tool_calls_by_name: BTreeMap<String, u64>,
}

#[derive(Default)]
struct Inner {
    request_count: u64,
    error_count: u64,
    latencies_ms: VecDeque<f64>,
    tool_calls: BTreeMap<String, u64>,
}

pub struct ChatStats {
    window: usize,
    inner: Mutex<Inner>,
}

impl ChatStats {
    /// `window` is the number of latency samples retained (oldest dropped first).
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn record_request(&self) {
        self.inner.lock().request_count += 1;
    }

    pub fn record_error(&self) {
        self.inner.lock().error_count += 1;
    }

    pub fn record_latency_ms(&self, latency_ms: f64) {
        let mut inner = self.inner.lock();
        if inner.latencies_ms.len() == self.window {
            inner.latencies_ms.pop_front();
        }
        inner.latencies_ms.push_back(latency_ms);
    }

    pub fn record_tool_call(&self, tool: &str) {
        *self.inner.lock().tool_calls.entry(tool.to_string()).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.lock();
        let samples: Vec<f64> = inner.latencies_ms.iter().copied().collect();
        let avg = if samples.is_empty() {
            0.0
        } else {
            samples.iter().sum::<f64>() / samples.len() as f64
        };
        StatsSnapshot {
            request_count: inner.request_count,
            error_count: inner.error_count,
            latency_avg_ms: round2(avg),
            latency_p95_ms: round2(p95(&samples)),
            tool_calls_total: inner.tool_calls.values().sum(),
            tool_calls_by_name: inner.tool_calls.clone(),
        }
    }
}

/// Nearest-rank 95th percentile: sorted index `ceil(0.95 n) - 1`, clamped.
pub fn p95(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    let rank = (0.95 * n as f64).ceil() as usize;
    let idx = rank.saturating_sub(1).min(n - 1);
    sorted[idx]
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
