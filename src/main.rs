//! apimon - API availability and certificate monitor.
//!
//! Periodically probes configured HTTP(S) endpoints and TLS hosts and
//! exposes availability, latency, and certificate-TTL gauges on `/metrics`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use apimon::config;
use apimon::metrics::Recorder;
use apimon::probe::Prober;
use apimon::scheduler::{Coordinator, Scheduler};
use apimon::web::Server;

#[derive(Parser, Debug)]
#[command(
    name = "apimon",
    about = "Probes configured endpoints and exposes Prometheus gauges"
)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "configs/application.yaml")]
    config: PathBuf,

    /// Override the configured environment (e.g. 'dev', 'prod')
    #[arg(long)]
    env: Option<String>,

    /// Override the configured per-probe timeout (e.g. '5s')
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("apimon=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut cfg = match config::load(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("Error loading configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(env) = args.env {
        tracing::info!("Environment override received from command line: {}", env);
        cfg.environment = env;
    }
    if let Some(timeout) = args.timeout {
        cfg.api_timeout = timeout;
    }

    tracing::info!("Monitoring environment: {}", cfg.environment);
    tracing::info!(
        "Probing {} targets every {:?} with a {:?} timeout",
        cfg.targets.len(),
        cfg.probe_interval,
        cfg.api_timeout
    );

    let recorder = Arc::new(Recorder::new()?);
    let prober = Arc::new(Prober::new()?);

    let coordinator = Coordinator::new(
        cfg.targets,
        prober,
        recorder.clone(),
        cfg.environment,
        cfg.api_timeout,
    );
    let scheduler = Scheduler::new(coordinator, cfg.probe_interval);

    let (stop_tx, stop_rx) = broadcast::channel(1);
    let scheduler_handle = tokio::spawn(scheduler.run(stop_rx));

    // A bind failure here is fatal; probe failures never are.
    let server = Server::new(cfg.metrics_port, recorder);
    server
        .start(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    // Stop the loop and let the in-flight cycle finish recording.
    let _ = stop_tx.send(());
    let _ = scheduler_handle.await;

    Ok(())
}
