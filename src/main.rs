//! Service coordinator (v1)
//!
//! Runs one leader election and, while this process leads, the configured
//! periodic jobs.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────────┐
//!                  │                 SERVICE COORDINATOR                  │
//!                  │                                                      │
//!   lock store ◀───┼── locker ◀── election ──events──▶ LeaderSupervisor   │
//!   (memory or     │              watchdog                  │             │
//!    redis)        │                                  start │ stop        │
//!                  │                                        ▼             │
//!                  │                                  JobScheduler        │
//!                  │                                  (rate limiter)      │
//!                  │                                                      │
//!   SIGTERM ───────┼──▶ Orchestrator ── shutdown hooks (priority order)   │
//!   panics  ───────┼──▶   root token                                      │
//!                  │                                                      │
//!   GET /readyz ◀──┼── probes ◀── ReadinessBarrier                        │
//!                  └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use service_coordinator::config::{load_config, validate_config, ConfigError, CoordinatorConfig};
use service_coordinator::lifecycle::build_service;
use service_coordinator::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "coordinator")]
#[command(about = "Leader-gated job runner with ordered shutdown", long_about = None)]
struct Cli {
    /// TOML configuration file; built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `election.name`.
    #[arg(short, long)]
    election: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => CoordinatorConfig::default(),
    };
    if let Some(name) = cli.election {
        config.election.name = name;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability)?;

    let mut runtime = tokio::runtime::Builder::new_multi_thread();
    runtime.enable_all();
    if let Some(threads) = config.runtime.worker_threads {
        runtime.worker_threads(threads);
    }
    runtime.build()?.block_on(run(config))
}

async fn run(config: CoordinatorConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        election = %config.election.name,
        backend = ?config.locker.backend,
        jobs = config.jobs.len(),
        "coordinator starting"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let service = build_service(&config).await?;
    service.run().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
