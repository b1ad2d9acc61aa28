pub mod schema;

pub use schema::{
    AgentConfig, Config, DelegationConfig, GatewayConfig, GcpConfig, MonitorConfig,
    ObservabilityConfig, TelegramConfig,
};
