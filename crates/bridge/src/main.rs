//! mcpo-bridge
//!
//! Launch a tool gateway, list its backends' tools or call one of them.

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use mcpo_bridge::config::{DEFAULT_GATEWAY_PROGRAM, DEFAULT_HOST, DEFAULT_PORT};
use mcpo_bridge::{
    GatewayCommand, GatewaySupervisor, McpConfig, Readiness, SupervisorConfig, ToolBridge,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "mcpo-bridge", version, about)]
struct Cli {
    /// Host the gateway binds to
    #[arg(long, env = "MCPO_BRIDGE_HOST", default_value = DEFAULT_HOST, global = true)]
    host: String,

    #[arg(long, env = "MCPO_BRIDGE_PORT", default_value_t = DEFAULT_PORT, global = true)]
    port: u16,

    /// Backend configuration file (`{"mcpServers": {...}}`, JSON or YAML)
    #[arg(long, env = "MCPO_BRIDGE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Gateway executable
    #[arg(
        long,
        env = "MCPO_BRIDGE_GATEWAY",
        default_value = DEFAULT_GATEWAY_PROGRAM,
        global = true
    )]
    gateway: PathBuf,

    /// Readiness timeout in seconds
    #[arg(long, env = "MCPO_BRIDGE_TIMEOUT_SECS", default_value_t = 30, global = true)]
    timeout_secs: u64,

    /// Use an already running gateway instead of launching one
    #[arg(long, global = true)]
    no_spawn: bool,

    /// Log filter, overridden by `RUST_LOG`
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the tool definitions of all backends as JSON
    Tools,
    /// Call one tool and print its result as JSON
    Call {
        tool: String,
        /// JSON object with the tool arguments
        #[arg(default_value = "{}")]
        arguments: String,
    },
    /// Keep the gateway running until interrupted
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format);
    tracing::debug!("mcpo-bridge v{VERSION}");

    let mcp_config = cli
        .config
        .as_deref()
        .map(McpConfig::from_path)
        .transpose()
        .context("load backend configuration")?;

    if cli.no_spawn {
        if matches!(cli.command, Commands::Serve) {
            anyhow::bail!("`serve` needs a gateway to launch; drop --no-spawn");
        }
        let bridge = ToolBridge::new(cli.host.clone(), cli.port, mcp_config);
        return run(&cli.command, &bridge).await;
    }

    let mcp_config = mcp_config.context("--config is required unless --no-spawn is given")?;
    let config = SupervisorConfig {
        gateway: GatewayCommand::new(cli.gateway.clone()),
        host: cli.host.clone(),
        port: cli.port,
        timeout: Duration::from_secs(cli.timeout_secs),
    };
    let mut supervisor = GatewaySupervisor::new(config, mcp_config);

    let result = supervise(&cli.command, &mut supervisor).await;

    supervisor.stop().await;
    supervisor.cleanup();
    result
}

async fn supervise(command: &Commands, supervisor: &mut GatewaySupervisor) -> anyhow::Result<()> {
    match supervisor.start(true).await? {
        Readiness::Ready | Readiness::Skipped => {}
        Readiness::TimedOut => {
            tracing::warn!(
                url = %supervisor.health_url(),
                "Gateway readiness not confirmed, continuing"
            );
        }
        Readiness::Exited => anyhow::bail!("gateway exited during startup"),
    }

    if matches!(command, Commands::Serve) {
        tracing::info!(url = %supervisor.base_url(), "Gateway running, press Ctrl+C to stop");
        wait_for_shutdown(supervisor).await;
        return Ok(());
    }

    let bridge = ToolBridge::for_supervisor(supervisor);
    run(command, &bridge).await
}

async fn run(command: &Commands, bridge: &ToolBridge) -> anyhow::Result<()> {
    match command {
        Commands::Tools => {
            let tools = bridge.list_tools().await?;
            println!("{}", serde_json::to_string_pretty(&tools)?);
        }
        Commands::Call { tool, arguments } => {
            bridge.list_tools().await?;
            let outcome = bridge.call(tool, arguments.as_str()).await?;
            println!("{}", serde_json::to_string_pretty(&outcome.into_value())?);
        }
        Commands::Serve => {}
    }
    Ok(())
}

/// Wait for Ctrl+C, SIGTERM or the gateway exiting on its own.
async fn wait_for_shutdown(supervisor: &GatewaySupervisor) {
    let finished = supervisor.signals().finished.clone();
    let gateway_exit = async move {
        while !finished.wait(Duration::from_secs(1)).await {}
    };

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
        () = gateway_exit => tracing::warn!("Gateway exited"),
    }
}

/// Logs go to stderr; stdout carries command output.
fn init_logging(log_level: &str, format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}
