//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Binary entrypoint for the fleet telemetry daemon."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pmfleet_common::{init_tracing, AppConfig};
use pmfleet_core::{FleetOrchestrator, SimulatorConnector};
use pmfleet_metrics::{
    new_registry, spawn_http_server, DaemonMetrics, SharedRegistry, StartupReport,
};
use tokio::signal;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    author,
    version = concat!("pmfleetd ", env!("CARGO_PKG_VERSION")),
    about = "Power-meter fleet telemetry daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Poll every device and aggregate until interrupted")]
    Run,
    #[command(about = "Take one snapshot per device and print the fleet report as JSON")]
    PollOnce,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/pmfleet.toml"));
    candidates.push(PathBuf::from("configs/pmfleet.dev.toml"));

    let load_started = Instant::now();
    let loaded = AppConfig::load_with_source(&candidates)?;
    let load_duration = load_started.elapsed();
    let config = loaded.config;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            init_tracing("pmfleetd", &config.logging)?;
            info!(
                config_path = %loaded.source.display(),
                devices = config.devices.len(),
                "configuration loaded"
            );

            let registry = new_registry();
            let daemon_metrics = DaemonMetrics::new(registry.clone())?;
            daemon_metrics.record_start(StartupReport {
                version: env!("CARGO_PKG_VERSION"),
                profile: build_profile(),
                config_load: load_duration,
                devices_configured: config.devices.len(),
                devices_connectable: config
                    .devices
                    .values()
                    .filter(|device| device.is_connectable())
                    .count(),
            });

            run_daemon(config, registry).await?
        }
        Commands::PollOnce => {
            // no subscriber here: stdout carries only the report
            let orchestrator =
                FleetOrchestrator::new(config, Arc::new(SimulatorConnector::new()), None)?;
            let report = orchestrator.poll_once().await?;
            let rendered =
                serde_json::to_string_pretty(&report).context("failed to render fleet report")?;
            println!("{rendered}");
        }
    }

    Ok(())
}

async fn run_daemon(config: AppConfig, registry: SharedRegistry) -> Result<()> {
    let metrics_settings = config.metrics.clone();

    let (metrics_server, metrics_registry) = if metrics_settings.enabled {
        info!(address = %metrics_settings.listen, "metrics exporter enabled");
        let server = spawn_http_server(registry.clone(), metrics_settings.listen)?;
        (Some(server), Some(registry))
    } else {
        info!("metrics exporter disabled by configuration");
        (None, None)
    };

    let orchestrator =
        FleetOrchestrator::new(config, Arc::new(SimulatorConnector::new()), metrics_registry)?;
    let handle = orchestrator.start().await?;
    if handle.device_count() == 0 {
        warn!("no devices are being polled");
    }

    info!(
        devices = handle.device_count(),
        device_type = %handle.config().fleet.device_type,
        "daemon running; waiting for termination signal"
    );
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");
    handle.shutdown().await?;

    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }

    Ok(())
}

fn build_profile() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    }
}
