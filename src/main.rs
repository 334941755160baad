//! Edge Proxy CLI
//!
//! Runs either side of the relay: the public coordinator that accepts proxy
//! requests, or the edge agent that executes them inside a private network.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use edgeproxy_agent::{AgentConfig, EdgeAgent};
use edgeproxy_server::{Coordinator, CoordinatorConfig, SelectionKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Edge Proxy - Reach private HTTP services through connected edge agents
#[derive(Parser, Debug)]
#[command(name = "edgeproxy")]
#[command(about = "Edge Proxy - Reach private HTTP services through connected edge agents")]
#[command(version = env!("GIT_TAG"))]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the coordinator that accepts proxy requests and agent connections
    #[command(long_about = r#"
Run the coordinator. Clients POST proxy requests to /proxy; edge agents
connect over WebSocket to /edge/ws/{agent_id}.

EXAMPLES:
  # Listen on the default port
  edgeproxy coordinator

  # Shorter relay timeout, spread load evenly
  edgeproxy coordinator --listen 0.0.0.0:9000 --relay-timeout 15 --selection round-robin

ENVIRONMENT VARIABLES:
  EDGEPROXY_LISTEN         Address to listen on
  EDGEPROXY_RELAY_TIMEOUT  Seconds to wait for an agent reply
  EDGEPROXY_SELECTION      Agent selection (random, round-robin)
"#)]
    Coordinator {
        /// Address to listen on
        #[arg(long, env = "EDGEPROXY_LISTEN", default_value = "0.0.0.0:8000")]
        listen: SocketAddr,

        /// Seconds to wait for an agent reply
        #[arg(long, env = "EDGEPROXY_RELAY_TIMEOUT", default_value = "60")]
        relay_timeout: u64,

        /// Agent selection strategy (random, round-robin)
        #[arg(long, env = "EDGEPROXY_SELECTION", default_value = "random")]
        selection: SelectionKind,

        /// Seconds between pings sent to each agent
        #[arg(long, default_value = "20")]
        ping_interval: u64,

        /// Seconds without any frame before an agent is dropped
        #[arg(long, default_value = "40")]
        idle_timeout: u64,
    },

    /// Run an edge agent that executes requests for the coordinator
    #[command(long_about = r#"
Connect to a coordinator and execute the HTTP requests it dispatches.
Reconnects automatically whenever the connection drops.

EXAMPLES:
  # Connect as agent "office"
  edgeproxy agent --server-url ws://coordinator.example.com:8000/edge/ws/office

  # Use a configuration file
  edgeproxy agent --config agent.yaml

ENVIRONMENT VARIABLES:
  SERVER_WS_URL  Coordinator WebSocket URL, ending with the agent id
  HTTP_TIMEOUT   Seconds before a forwarded request fails
"#)]
    Agent {
        /// Coordinator WebSocket URL (e.g., ws://localhost:8000/edge/ws/dev)
        #[arg(long, env = "SERVER_WS_URL")]
        server_url: Option<String>,

        /// Seconds before a forwarded request fails
        #[arg(long, env = "HTTP_TIMEOUT")]
        http_timeout: Option<u64>,

        /// Seconds to wait before reconnecting
        #[arg(long)]
        reconnect_delay: Option<u64>,

        /// Seconds without any frame before the connection is dropped
        #[arg(long)]
        idle_timeout: Option<u64>,

        /// Configuration file (YAML)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}

/// Agent configuration file format
#[derive(Debug, Default, Serialize, Deserialize)]
struct AgentConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    server_url: Option<String>,

    /// Seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    http_timeout: Option<u64>,

    /// Seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    reconnect_delay: Option<u64>,

    /// Seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    ping_interval: Option<u64>,

    /// Seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    idle_timeout: Option<u64>,
}

/// Setup logging with the specified log level
fn setup_logging(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level)
        .with_context(|| format!("Invalid log level: {}", log_level))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}

/// Load configuration from YAML file
fn load_config_file(path: &PathBuf) -> Result<AgentConfigFile> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: AgentConfigFile = serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Merge CLI args with the config file, giving precedence to CLI args
fn build_agent_config(
    server_url: Option<String>,
    http_timeout: Option<u64>,
    reconnect_delay: Option<u64>,
    idle_timeout: Option<u64>,
    config: Option<PathBuf>,
) -> Result<AgentConfig> {
    let file = match &config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            load_config_file(path)?
        }
        None => AgentConfigFile::default(),
    };

    let defaults = AgentConfig::default();
    let seconds = |cli: Option<u64>, file: Option<u64>, default: Duration| {
        cli.or(file).map(Duration::from_secs).unwrap_or(default)
    };

    Ok(AgentConfig {
        server_url: server_url.or(file.server_url).unwrap_or(defaults.server_url),
        http_timeout: seconds(http_timeout, file.http_timeout, defaults.http_timeout),
        reconnect_delay: seconds(reconnect_delay, file.reconnect_delay, defaults.reconnect_delay),
        ping_interval: seconds(None, file.ping_interval, defaults.ping_interval),
        idle_timeout: seconds(idle_timeout, file.idle_timeout, defaults.idle_timeout),
    })
}

async fn run_coordinator(config: CoordinatorConfig) -> Result<()> {
    info!(
        "Edge Proxy coordinator starting ({}, built {})",
        env!("GIT_HASH"),
        env!("BUILD_TIME")
    );

    let coordinator = Coordinator::new(config);
    tokio::select! {
        result = coordinator.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            Ok(())
        }
    }
}

async fn run_agent(config: AgentConfig) -> Result<()> {
    info!(
        "Edge Proxy agent starting ({}, built {})",
        env!("GIT_HASH"),
        env!("BUILD_TIME")
    );
    info!("Coordinator: {}", config.server_url);
    info!("HTTP timeout: {:?}", config.http_timeout);

    let agent = EdgeAgent::new(config).context("Failed to create agent")?;
    tokio::select! {
        _ = agent.run() => {
            error!("Agent loop exited unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    info!("Edge agent stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level)?;

    match cli.command {
        Commands::Coordinator {
            listen,
            relay_timeout,
            selection,
            ping_interval,
            idle_timeout,
        } => {
            run_coordinator(CoordinatorConfig {
                listen_addr: listen,
                relay_timeout: Duration::from_secs(relay_timeout),
                selection,
                ping_interval: Duration::from_secs(ping_interval),
                idle_timeout: Duration::from_secs(idle_timeout),
            })
            .await
        }
        Commands::Agent {
            server_url,
            http_timeout,
            reconnect_delay,
            idle_timeout,
            config,
        } => {
            let config = build_agent_config(
                server_url,
                http_timeout,
                reconnect_delay,
                idle_timeout,
                config,
            )?;
            run_agent(config).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cli_args_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "server_url: ws://from-file:8000/edge/ws/office\nhttp_timeout: 10\nping_interval: 7\nidle_timeout: 12"
        )
        .unwrap();

        let config = build_agent_config(
            None,
            Some(3),
            None,
            None,
            Some(file.path().to_path_buf()),
        )
        .unwrap();

        assert_eq!(config.server_url, "ws://from-file:8000/edge/ws/office");
        assert_eq!(config.http_timeout, Duration::from_secs(3));
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.ping_interval, Duration::from_secs(7));
        assert_eq!(config.idle_timeout, Duration::from_secs(12));
    }

    #[test]
    fn test_agent_defaults_without_config() {
        let config = build_agent_config(None, None, None, None, None).unwrap();
        assert_eq!(config.server_url, "ws://localhost:8000/edge/ws/dev");
        assert_eq!(config.http_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_cli_parses_coordinator_selection() {
        let cli = Cli::try_parse_from([
            "edgeproxy",
            "coordinator",
            "--selection",
            "round-robin",
            "--relay-timeout",
            "15",
        ])
        .unwrap();

        match cli.command {
            Commands::Coordinator {
                relay_timeout,
                selection,
                ping_interval,
                idle_timeout,
                ..
            } => {
                assert_eq!(relay_timeout, 15);
                assert_eq!(selection, SelectionKind::RoundRobin);
                assert_eq!((ping_interval, idle_timeout), (20, 40));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
