//! Botherd - IRC Connection Pool Daemon
//!
//! Maintains a pool of IRC client connections per server and packs channel
//! memberships onto them, spawning and retiring connections as the channel
//! set grows and shrinks.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use botherd::{
    config::ConfigManager, control::ControlServer, metrics::Metrics, Pool, ShutdownCoordinator,
};

/// CLI arguments for botherd
#[derive(Parser, Debug)]
#[command(name = "botherd")]
#[command(about = "botherd - IRC connection pool daemon")]
#[command(version)]
#[command(long_about = "
botherd - IRC connection pool daemon

Maintains a pool of IRC client connections per server and packs channel
memberships onto them. Channels are added and removed at runtime through
the HTTP control API; connections are spawned and retired to match.

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables:
  BOTHERD_CONTROL_BIND_ADDR        - Control API bind address (e.g., 127.0.0.1:8430)
  BOTHERD_NICK_FORMAT              - Nickname template with a {} placeholder
  BOTHERD_CHANNELS_PER_CONNECTION  - Channel capacity per connection
  BOTHERD_RECONNECT_DELAY          - Reconnect delay (e.g., 5s, 1m)
  BOTHERD_LOG_LEVEL                - Log level (trace, debug, info, warn, error)
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "config.toml",
        help = "Path to configuration file"
    )]
    pub config: PathBuf,

    /// Control API bind address (overrides config file)
    #[arg(long, help = "Control API bind address (e.g., 127.0.0.1:8430)")]
    pub control_bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", help = "Log level")]
    pub log_level: String,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Channel capacity per connection (overrides config file)
    #[arg(long, help = "Channel capacity per connection")]
    pub capacity: Option<usize>,

    /// Nickname template with a {} placeholder (overrides config file)
    #[arg(long, help = "Nickname template, e.g. herd-{}")]
    pub nick_format: Option<String>,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Initialize tracing
    init_tracing(&args)?;

    info!(
        "Starting botherd v{} - IRC connection pool daemon",
        env!("CARGO_PKG_VERSION")
    );

    // Load configuration with priority: CLI args > config file > environment > defaults
    let mut config = if args.config.exists() {
        ConfigManager::load_from_file(&args.config)?
    } else {
        info!("Config file not found, checking environment variables");
        ConfigManager::load_from_env()?
    };

    // Apply CLI argument overrides (highest priority)
    config.merge_with_cli_args(
        args.control_bind.as_deref(),
        args.capacity,
        args.nick_format.as_deref(),
    );

    // Final validation after all overrides
    config
        .validate()
        .context("Final configuration validation failed")?;

    // If validate-config flag is set, just validate and exit
    if args.validate_config {
        info!("Configuration is valid");
        info!("Configuration summary:");
        info!("  Nick format: {}", config.irc.nick_format);
        info!(
            "  Channels per connection: {}",
            config.irc.channels_per_connection
        );
        info!("  Reconnect delay: {:?}", config.irc.reconnect_delay);
        info!(
            "  Control API: {}",
            if config.control_api.enabled {
                format!("enabled on {}", config.control_api.bind_addr)
            } else {
                "disabled".to_string()
            }
        );
        return Ok(());
    }

    info!("Configuration loaded successfully");
    info!("Nick format: {}", config.irc.nick_format);
    info!(
        "Channels per connection: {}",
        config.irc.channels_per_connection
    );

    // Create shutdown coordinator
    let shutdown_timeout = config.daemon.shutdown_timeout;
    let shutdown_coordinator = ShutdownCoordinator::new(shutdown_timeout);

    // Create metrics
    let metrics = Arc::new(Metrics::new());

    // Create the pool and start its supervisor
    let config = Arc::new(config);
    let (pool, spawn_rx) = Pool::new(Arc::clone(&config), Arc::clone(&metrics));
    let supervisor_handle = tokio::spawn(Arc::clone(&pool).supervise(spawn_rx));

    // Start control API server if enabled
    let control_handle = if config.control_api.enabled {
        info!(
            "Starting control API server on {}",
            config.control_api.bind_addr
        );

        let control_server = ControlServer::new(
            config.control_api.bind_addr,
            Arc::clone(&pool),
            Arc::clone(&metrics),
            config.control_api.auth.clone(),
        );
        let shutdown_rx = shutdown_coordinator.subscribe();

        Some(tokio::spawn(async move {
            if let Err(e) = control_server.start(shutdown_rx).await {
                error!("Control API server error: {}", e);
            }
        }))
    } else {
        info!("Control API server disabled");
        None
    };

    info!("botherd started, press Ctrl+C or send SIGTERM/SIGINT to shutdown gracefully");

    // Block until a shutdown signal arrives
    let signal_result = shutdown_coordinator.listen_for_signals().await;
    if let Err(e) = signal_result {
        error!("Error setting up signal handlers: {}", e);
    }

    // Initiate graceful shutdown: retire every connection and wait
    info!("Initiating graceful shutdown...");
    if let Err(e) = shutdown_coordinator.shutdown_pool(&pool).await {
        error!("Error during pool shutdown: {}", e);
    }

    // The control server drains on the same shutdown signal; wait for it
    if let Some(handle) = control_handle {
        if let Err(e) = handle.await {
            error!("Control API server task failed: {}", e);
        }
    }
    supervisor_handle.abort();

    info!("Shutdown complete");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(args: &CliArgs) -> Result<()> {
    let log_level = if args.verbose {
        "debug"
    } else {
        &args.log_level
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}
