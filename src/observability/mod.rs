//! Logging setup and Prometheus metrics.

pub mod metrics;

pub use metrics::GatewayMetrics;

use crate::config::ObservabilityConfig;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `observability.log_level`. Returns `false` when a
/// subscriber was already installed.
pub fn init_logging(config: &ObservabilityConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    let result = if config.log_format == "json" {
        fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .try_init()
    } else {
        fmt().with_env_filter(filter).with_target(false).try_init()
    };
    result.is_ok()
}
