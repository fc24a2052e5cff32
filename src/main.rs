//! sequencer-reconcile -- keep exactly one rollup sequencer active.
//!
//! Startup resolves the cluster, then runs the heartbeat (essential) and
//! the health endpoint and pod labeller (best effort) on one task pool.
//! SIGTERM/SIGINT cancel the pool; a terminal failover also cancels it and
//! makes the process exit non-zero.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sequencer_reconcile::cluster::discovery::resolve_cluster;
use sequencer_reconcile::config::{load_config, Config};
use sequencer_reconcile::health::Phase;
use sequencer_reconcile::heartbeat::HeartbeatService;
use sequencer_reconcile::server::HttpService;
use sequencer_reconcile::service::{Service, ServiceAggregator};
use sequencer_reconcile::task::TaskPool;
use sequencer_reconcile::AppState;

/// Command-line arguments for the controller.
#[derive(Parser, Debug)]
#[command(
    name = "sequencer-reconcile",
    version,
    about = "Failover controller for rollup sequencers"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "reconcile.yaml")]
    config: String,

    /// Override `logging.format` (text or json).
    #[arg(long)]
    log_format: Option<String>,

    /// Override `logging.level`; `RUST_LOG` still wins.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config))?;
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    init_tracing(&config);
    config.validate()?;
    info!(config = %cli.config, "configuration loaded");

    if config.observability.metrics {
        sequencer_reconcile::metrics::init_metrics()?;
        sequencer_reconcile::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let cluster = resolve_cluster(&config).await?;
    info!(cluster_size = cluster.len(), "sequencer cluster resolved");

    let state = Arc::new(AppState::new(config, cluster)?);
    let aggregator = ServiceAggregator::new(&state, services(&state.config))?;
    info!(services = ?aggregator.names(), "services initialized");

    let pool = TaskPool::new();
    aggregator.run(&pool)?;

    tokio::select! {
        _ = shutdown_signal() => {}
        _ = pool.cancelled() => {}
    }

    let timeout = state.config.server.shutdown_timeout;
    if tokio::time::timeout(timeout, pool.shutdown()).await.is_err() {
        warn!(?timeout, "tasks did not stop in time");
    }

    let snapshot = state.health.snapshot();
    if snapshot.phase == Phase::Terminal {
        anyhow::bail!("no sequencer could be activated, manual intervention required");
    }
    info!("sequencer-reconcile shut down");
    Ok(())
}

fn services(config: &Config) -> Vec<Box<dyn Service>> {
    let mut services: Vec<Box<dyn Service>> = vec![Box::new(HeartbeatService::new())];
    if config.server.enabled {
        services.push(Box::new(HttpService::new()));
    }
    #[cfg(feature = "kubernetes")]
    if config.label.enabled && !config.discovery.statefulset.is_empty() {
        services.push(Box::new(
            sequencer_reconcile::service::label::LabelService::new(),
        ));
    }
    services
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
