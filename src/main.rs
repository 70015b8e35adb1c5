//! Fleetpace - Fleet Convergence Pacing Daemon
//!
//! Spreads configuration convergence evenly across a managed fleet so
//! the backend never sees two nodes converge at once.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleetpace::config::FleetpaceConfig;
use fleetpace::error::Result;
use fleetpace::fleet::{CommandFleet, FleetControl};
use fleetpace::scheduler::Dispatcher;

/// Fleetpace - Fleet Convergence Pacing Daemon
#[derive(Parser)]
#[command(name = "fleetpace")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "fleetpace.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the scheduling daemon
    Start,

    /// Run a one-shot fleet probe and print the reachable nodes
    Probe,

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "fleetpace.toml")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,

    /// Show effective settings
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    match cli.command {
        Commands::Start => run_start(cli.config).await,
        Commands::Probe => run_probe(cli.config).await,
        Commands::Init { output } => run_init(output),
        Commands::Validate => run_validate(cli.config),
        Commands::Info => run_info(cli.config),
    }
}

/// Initialize logging
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Start the scheduling daemon
async fn run_start(config_path: PathBuf) -> Result<()> {
    tracing::info!("Fleetpace starting up");

    let config = match FleetpaceConfig::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load configuration from {:?}: {}", config_path, e);
            tracing::error!("Please check that the config file exists and is valid TOML");
            return Err(e);
        }
    };
    tracing::info!(
        "Full convergence pass every {}s, rediscovery every {}s",
        config.scheduler.run_interval_secs,
        config.scheduler.rediscover_interval_secs
    );

    let fleet = CommandFleet::new(&config.fleet)?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
            signal_token.cancel();
        }
    });

    let mut dispatcher = Dispatcher::new(fleet, &config, shutdown);
    dispatcher.run().await?;

    tracing::info!("Fleetpace shutdown complete");
    Ok(())
}

/// One-shot fleet probe
async fn run_probe(config_path: PathBuf) -> Result<()> {
    let config = FleetpaceConfig::from_file(&config_path)?;
    let fleet = CommandFleet::new(&config.fleet)?;

    let nodes = fleet.probe().await?;
    println!("{} reachable node(s)", nodes.len());
    for node in nodes {
        println!("  {}", node);
    }

    Ok(())
}

/// Initialize configuration file
fn run_init(output: PathBuf) -> Result<()> {
    let config_content = r#"# Fleetpace Configuration
# Generated configuration file

[scheduler]
# Time for one full convergence pass over the fleet, in seconds
run_interval_secs = 3600
# How often fleet membership is re-probed, in seconds
rediscover_interval_secs = 600
# Wait between retries while no nodes are reachable, in seconds
empty_roster_backoff_secs = 30

[fleet]
# Probe command: must print a JSON object of node -> liveness on stdout
probe_command = "salt --static --out=json '*' test.ping"
# Convergence command: {node} is replaced with the node identifier
converge_command = "salt --static --out=json {node} state.highstate"
# Timeout for a single fleet command, in seconds
command_timeout_secs = 300

[logging]
level = "info"
format = "pretty"
"#;

    std::fs::write(&output, config_content)?;
    println!("Configuration file created: {}", output.display());
    println!("\nEdit the file to configure your fleet commands and cadence.");
    println!("Then start with: fleetpace start --config {}", output.display());

    Ok(())
}

/// Validate configuration
fn run_validate(config_path: PathBuf) -> Result<()> {
    match FleetpaceConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Run Interval:        {} s", config.scheduler.run_interval_secs);
            println!("  Rediscover Interval: {} s", config.scheduler.rediscover_interval_secs);
            println!("  Probe Command:       {}", config.fleet.probe_command);
            println!("  Converge Command:    {}", config.fleet.converge_command);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Show effective settings
fn run_info(config_path: PathBuf) -> Result<()> {
    let config = FleetpaceConfig::from_file(&config_path)?;

    println!("Fleetpace Settings");
    println!("==================");
    println!();
    println!("Scheduler:");
    println!("  Run Interval:        {} s", config.scheduler.run_interval_secs);
    println!("  Rediscover Interval: {} s", config.scheduler.rediscover_interval_secs);
    println!("  Empty Backoff:       {} s", config.scheduler.empty_roster_backoff_secs);
    println!();
    println!("Fleet:");
    println!("  Probe Command:       {}", config.fleet.probe_command);
    println!("  Converge Command:    {}", config.fleet.converge_command);
    println!("  Command Timeout:     {} s", config.fleet.command_timeout_secs);
    println!();
    println!("Logging:");
    println!("  Level:               {}", config.logging.level);
    println!("  Format:              {}", config.logging.format);

    Ok(())
}
