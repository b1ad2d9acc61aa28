#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

use agentwatch::agent::{self, AgentDeps};
use agentwatch::cloud::GcpClient;
use agentwatch::config::Config;
use agentwatch::monitor::SessionMonitor;
use agentwatch::{channels, gateway, observability, providers, sessions};
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

/// `agentwatch` - chat gateway and session monitor for a tool-calling agent.
#[derive(Parser, Debug)]
#[command(name = "agentwatch")]
#[command(version)]
#[command(about = "Chat gateway for a tool-calling LLM agent with session monitoring.", long_about = None)]
struct Cli {
    /// Directory holding config.toml (default: ~/.agentwatch)
    #[arg(long, global = true)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP gateway (chat API, dashboard, stats, metrics)
    #[command(long_about = "\
Start the HTTP gateway.

Serves the chat API, the dashboard, /health, /stats, /metrics and the \
session reports. Bind address defaults to the values in your config \
file (gateway.host / gateway.port).

Examples:
  agentwatch gateway                  # use config defaults
  agentwatch gateway -p 8080          # listen on port 8080
  agentwatch gateway --host 0.0.0.0   # bind to all interfaces
  AGENTWATCH_TEST_MODE=1 agentwatch gateway   # echo without calling the model")]
    Gateway {
        /// Port to listen on; defaults to config gateway.port
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to; defaults to config gateway.host
        #[arg(long)]
        host: Option<String>,
    },

    /// Run the Telegram bridge that forwards messages to the gateway
    #[command(long_about = "\
Run the Telegram bridge.

Long-polls the Telegram Bot API and forwards text messages to the \
gateway's /api/chat endpoint (telegram.agent_api_url). The bot token \
comes from TELEGRAM_BOT_TOKEN / telegram.bot_token, then Secret Manager \
(TELEGRAM_BOT_TOKEN_SECRET_ID), then a .telegram_bot file in the \
working directory.

Examples:
  TELEGRAM_BOT_TOKEN=123:abc agentwatch telegram
  AGENT_API_URL=https://agent.example.com agentwatch telegram")]
    Telegram,

    /// Show the effective configuration
    Status,

    /// List the tools registered on each agent
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(config_dir) = &cli.config_dir {
        if config_dir.trim().is_empty() {
            bail!("--config-dir cannot be empty");
        }
        std::env::set_var("AGENTWATCH_CONFIG_DIR", config_dir);
    }

    let config = Config::load_or_init().await?;
    observability::init_logging(&config.observability);
    config.warn_if_world_readable().await;
    info!(path = %config.config_path.display(), "Config loaded");

    match cli.command {
        Commands::Gateway { port, host } => {
            let port = port.unwrap_or(config.gateway.port);
            let host = host.unwrap_or_else(|| config.gateway.host.clone());
            info!("Starting agentwatch gateway on {host}:{port}");
            gateway::run_gateway(&host, port, config).await
        }

        Commands::Telegram => channels::run_telegram(config).await,

        Commands::Status => {
            print_status(&config);
            Ok(())
        }

        Commands::Tools => print_tools(&config),
    }
}

fn print_status(config: &Config) {
    let set = |v: Option<&String>| if v.is_some_and(|s| !s.is_empty()) { "set" } else { "not set" };

    println!("agentwatch {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Config:       {}", config.config_path.display());
    println!(
        "Provider:     {} ({})",
        config.provider(),
        providers::display_name(config.provider())
    );
    println!("Model:        {}", config.model());
    println!("API key:      {}", set(config.api_key.as_ref()));
    println!("Agent:        {}", config.agent.name);
    println!(
        "Delegation:   {} (timeout {}s)",
        config.delegation.agent_name, config.delegation.timeout_secs
    );
    println!();
    println!("Gateway:      {}:{}", config.gateway.host, config.gateway.port);
    println!("Test mode:    {}", if config.gateway.test_mode { "on" } else { "off" });
    println!(
        "Monitor:      {} events/session, {}",
        config.monitor.max_events,
        if config.monitor.max_sessions == 0 {
            "unbounded sessions".to_string()
        } else {
            format!("max {} sessions", config.monitor.max_sessions)
        }
    );
    println!();
    println!(
        "GCP project:  {}",
        config.gcp.project_id.as_deref().unwrap_or("(not configured)")
    );
    println!("Search store: {}", set(config.gcp.search_data_store_id.as_ref()));
    println!(
        "Telegram:     token {}, forwarding to {}",
        if config.telegram.bot_token.is_some() || config.telegram.bot_token_secret_id.is_some() {
            "configured"
        } else {
            "not configured"
        },
        config.telegram.agent_api_url
    );
    println!(
        "Logging:      {} ({})",
        config.observability.log_level, config.observability.log_format
    );
}

fn print_tools(config: &Config) -> Result<()> {
    let provider = providers::create_provider_with_url(
        config.provider(),
        config.api_key.as_deref(),
        config.api_url.as_deref(),
    )?;
    let deps = AgentDeps {
        provider: Arc::from(provider),
        store: sessions::create_conversation_store(),
        gcp: Arc::new(GcpClient::from_config(&config.gcp)),
        monitor: Arc::new(SessionMonitor::from_config(&config.monitor)),
    };
    let devops = agent::build_devops_agent(config, &deps);
    let devops_specs = devops.tool_specs();
    let root = agent::build_root_agent(config, &deps, Arc::new(devops));

    for (agent_name, specs) in [
        (config.agent.name.as_str(), root.tool_specs()),
        (config.delegation.agent_name.as_str(), devops_specs),
    ] {
        println!("{agent_name} ({} tools)", specs.len());
        for spec in specs {
            println!("  {:<24} {}", spec.name, spec.description);
        }
        println!();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_has_no_flag_conflicts() {
        Cli::command().debug_assert();
    }

    #[test]
    fn gateway_flags_parse() {
        let cli = Cli::try_parse_from(["agentwatch", "gateway", "-p", "9000", "--host", "0.0.0.0"])
            .unwrap();
        match cli.command {
            Commands::Gateway { port, host } => {
                assert_eq!(port, Some(9000));
                assert_eq!(host.as_deref(), Some("0.0.0.0"));
            }
            other => panic!("expected gateway command, got {other:?}"),
        }
    }

    #[test]
    fn config_dir_is_global() {
        let cli = Cli::try_parse_from(["agentwatch", "status", "--config-dir", "/tmp/aw"]).unwrap();
        assert_eq!(cli.config_dir.as_deref(), Some("/tmp/aw"));
        assert!(matches!(cli.command, Commands::Status));
    }
}
