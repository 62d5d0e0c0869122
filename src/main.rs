//! gaia-exporter - Prometheus exporter for Gaia / Tendermint nodes
//!
//! Usage:
//!     gaia-exporter [--config <path>] [--target <url>] [--listen <addr>]
//!
//! See --help for more options.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use gaia_exporter::config::{resolve_config, Config, Overrides};
use gaia_exporter::metrics::{Descriptors, Exporter, MetricsServer, NodeCollector};
use gaia_exporter::node::NodeClient;
use gaia_exporter::util::{init_logging, ShutdownSignal};

/// Prometheus exporter for Gaia / Tendermint node health.
#[derive(Parser, Debug)]
#[command(name = "gaia-exporter")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to an optional YAML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Target to scrape metrics from (overrides target.url)
    #[arg(short, long, value_name = "URL")]
    target: Option<String>,

    /// Address to serve metrics on (overrides metrics.address)
    #[arg(long, value_name = "ADDR")]
    listen: Option<SocketAddr>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let overrides = Overrides {
        target: cli.target,
        listen: cli.listen,
        log_level: cli.log_level,
    };
    let config = resolve_config(cli.config.as_deref(), &overrides)
        .with_context(|| match &cli.config {
            Some(path) => format!("failed to load configuration from '{}'", path.display()),
            None => "invalid configuration".to_string(),
        })?;

    init_logging(&config.global).context("failed to initialize logging")?;

    if cli.validate {
        info!("Configuration is valid");
        println!("Configuration is valid.");
        println!("  Target: {} (timeout {:?})", config.target.url, config.target.timeout);
        println!(
            "  Metrics: http://{}{}",
            config.metrics.address, config.metrics.path
        );
        return Ok(());
    }

    info!(
        target_node = %config.target.url,
        timeout = ?config.target.timeout,
        listen = %config.metrics.address,
        path = %config.metrics.path,
        "gaia-exporter starting"
    );

    run(config)
}

/// Run the exporter with the given configuration.
fn run(config: Config) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(async { run_async(config).await })
}

/// Async entry point for the exporter.
async fn run_async(config: Config) -> Result<()> {
    let shutdown = ShutdownSignal::new();

    let collector = NodeCollector::new(NodeClient::from_config(&config.target));
    let exporter = Arc::new(Exporter::new(collector, Descriptors::new()));

    let server = MetricsServer::bind(config.metrics.address, config.metrics.path.clone(), exporter)
        .await
        .with_context(|| {
            format!(
                "failed to bind metrics server on {}",
                config.metrics.address
            )
        })?;

    let server_shutdown = shutdown.subscribe();
    let handle = tokio::spawn(async move {
        server.run(server_shutdown).await;
    });

    info!("gaia-exporter is running");
    info!("press Ctrl+C to stop");

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("received shutdown signal");
        }
        Err(e) => {
            error!(error = %e, "failed to listen for shutdown signal");
        }
    }

    shutdown.shutdown();
    let _ = handle.await;

    info!("gaia-exporter shut down complete");
    Ok(())
}
