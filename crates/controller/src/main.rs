//! Capacity Controller - adaptive node power management
//!
//! Runs next to the cluster, labels worker nodes by capacity role and
//! powers standby workers on or off through their BMCs.

use anyhow::Result;
use controller_lib::{
    actuator::{Actuator, IpmiPowerClient, KubeLabelClient},
    controller::{ControlLoopBuilder, Controller},
    health::{components, HealthRegistry},
    ingest::{SnapshotIngestor, SnapshotPaths},
    observability::{ControllerMetrics, StructuredLogger},
    store::{MetricsLog, StateStore},
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const CONTROLLER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting capacity-controller");

    let config = config::ControllerConfig::load()?;
    info!(
        controller_id = %config.controller_id,
        fleet_size = config.fleet.len(),
        data_dir = %config.data_dir.display(),
        "Controller configured"
    );

    let health_registry = HealthRegistry::new();
    for name in components::ALL {
        health_registry.register(name).await;
    }

    let metrics = ControllerMetrics::new();

    let logger = StructuredLogger::new(config.controller_id.clone());
    logger.log_startup(CONTROLLER_VERSION, config.fleet.len());

    let kube_client = kube::Client::try_default().await?;
    let labels = Arc::new(KubeLabelClient::new(
        kube_client,
        config.label_key.clone(),
        config.command_timeout(),
    ));
    let power = Arc::new(IpmiPowerClient::new(config.command_timeout()));
    let actuator = Actuator::new(labels, power, &config.fleet, logger.clone());

    let controller = Controller::new(
        SnapshotIngestor::new(
            SnapshotPaths::in_dir(&config.data_dir),
            config.control_plane_markers.clone(),
        ),
        StateStore::in_dir(&config.data_dir),
        actuator,
        config.fleet.clone(),
        logger.clone(),
    )
    .with_metrics_log(MetricsLog::in_dir(&config.data_dir))
    .with_health(health_registry.clone());

    let control_loop = ControlLoopBuilder::new()
        .controller(controller)
        .interval(config.poll_interval())
        .build()?;

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics));
    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let loop_handle = tokio::spawn(control_loop.run(shutdown_rx));

    let reason = shutdown_signal().await?;
    logger.log_shutdown(reason);
    health_registry.set_ready(false).await;

    // The loop finishes an in-flight cycle before it stops
    if shutdown_tx.send(()).is_err() {
        warn!("Control loop already stopped");
    }
    let controller = loop_handle.await?;
    api_handle.abort();

    info!(cycles = controller.cycles(), "Shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM
#[cfg(unix)]
async fn shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            Ok("SIGINT received")
        }
        _ = sigterm.recv() => Ok("SIGTERM received"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("SIGINT received")
}
