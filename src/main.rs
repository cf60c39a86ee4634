//! eddn-relay - EDDN to NATS streaming relay
//!
//! Wires the pieces together: configuration, logging, the schema
//! validator, the bus connection, the feed subscriber, and the pipeline
//! loop, plus the graceful-shutdown plumbing between them.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use eddn_relay::{config::RelayConfig, feed, metrics, stats};
use eddn_relay::{
    EventBus, NatsBus, Publisher, RelayMetrics, RelayRunner, SchemaValidator, StatsRecorder,
};

#[derive(Parser)]
#[command(name = "eddn-relay")]
#[command(version, about = "Relay EDDN messages to NATS subjects")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "relay.yaml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay (default)
    Run,
    /// Validate configuration file
    Validate,
    /// List the schemas compiled at startup
    Schemas,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli.config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::Validate => validate_config(config),
        Commands::Schemas => list_schemas(config),
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// A missing config file is not an error: the defaults relay the public
/// feed to a local NATS server.
fn load_config(path: &PathBuf) -> Result<RelayConfig> {
    if path.exists() {
        RelayConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))
    } else {
        info!(path = %path.display(), "no config file found, using defaults");
        Ok(RelayConfig::default())
    }
}

async fn run(config: RelayConfig) -> Result<()> {
    config.validate()?;
    info!(
        feed = %config.feed.endpoint,
        bus = ?config.bus.servers,
        "starting eddn-relay"
    );

    let relay_metrics = RelayMetrics::new();

    // Start metrics server if enabled
    if config.settings.metrics.enabled {
        let metrics_config = config.settings.metrics.clone();
        let handle = relay_metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = metrics::start_metrics_server(metrics_config, handle).await {
                error!("Metrics server failed: {e}");
            }
        });
    }

    // Preload fetches and compiles schemas over blocking IO; a failure here
    // aborts startup before the feed is touched
    let schema_config = config.schemas.clone();
    let validator = tokio::task::spawn_blocking(move || SchemaValidator::new(&schema_config))
        .await
        .context("schema preload task failed")??;
    let validator = Arc::new(validator);
    info!(
        schemas = validator.cached_schemas(),
        "schema preload complete"
    );

    let bus = Arc::new(NatsBus::connect(&config.bus).await?);
    let publisher = Publisher::new(bus.clone(), relay_metrics.clone());

    let stats = Arc::new(StatsRecorder::new());
    let stats_logger = stats::spawn_stats_logger(
        stats.clone(),
        Duration::from_secs(config.settings.stats_interval_secs),
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal (Ctrl+C)");
                let _ = shutdown_tx.send(());
            }
        });
    }

    let (frame_tx, frame_rx) = mpsc::channel(config.settings.channel_capacity);
    let subscriber = tokio::spawn(feed::subscribe(
        config.feed.endpoint.clone(),
        frame_tx,
        shutdown_tx.subscribe(),
    ));

    let runner = RelayRunner::new(
        validator,
        publisher,
        relay_metrics,
        stats,
        Duration::from_millis(config.settings.slow_threshold_ms),
    );
    let result = runner.run(frame_rx, shutdown_tx.subscribe(), subscriber).await;

    stats_logger.abort();
    if let Err(e) = bus.flush().await {
        error!("Final bus flush failed: {e}");
    }

    result?;
    info!("Shutdown complete");
    Ok(())
}

fn validate_config(config: RelayConfig) -> Result<()> {
    config.validate()?;
    println!("Configuration is valid");
    println!("  feed endpoint:  {}", config.feed.endpoint);
    println!("  bus servers:    {}", config.bus.servers.join(", "));
    println!("  preload schemas: {}", config.schemas.preload.len());
    println!(
        "  metrics:        {}",
        if config.settings.metrics.enabled {
            format!("enabled on port {}", config.settings.metrics.port)
        } else {
            "disabled".to_string()
        }
    );
    Ok(())
}

fn list_schemas(config: RelayConfig) -> Result<()> {
    for url in &config.schemas.preload {
        println!("{url}");
    }
    Ok(())
}
