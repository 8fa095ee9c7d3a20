use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tool_relay::bus::{BusClient, BusOptions, BusRole, MessageHandler};
use tool_relay::config::RelayConfig;
use tool_relay::relay::Relay;
use tool_relay::router::{ToolMapping, TopicRouter};
use tool_relay::state::RelayMetrics;
use tool_relay::supervisor::{CommandRestarter, Supervisor, TcpProbe};
use tool_relay::transform::Transformer;
use tracing::{info, warn};

const DEFAULT_CONFIG_FILE: &str = "tool-relay.toml";

/// Upper bound on waiting for drivers to flush after disconnect
const DRIVER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tool_relay=info".into()),
        )
        .init();

    info!("Tool relay starting...");

    let config_path = config_path();
    let config = RelayConfig::load(config_path.as_deref()).context("Invalid configuration")?;

    info!(
        config_file = ?config_path,
        backend = %config.backend.endpoint(),
        backend_namespace = %config.backend.namespace,
        device = %config.device.endpoint(),
        device_namespace = %config.device.namespace,
        liveness_topic = %config.liveness_topic,
        timezone_offset_hours = config.display.timezone_offset_hours,
        "Configuration loaded"
    );

    let mapping = config
        .mapping_file
        .as_deref()
        .map(ToolMapping::load)
        .transpose()?;

    let router = TopicRouter::new(&config.backend.namespace, mapping);
    let metrics = RelayMetrics::new();

    // Device bus: outbound only, carries the liveness topic
    let (device, device_driver) = BusClient::connect(
        BusRole::Device,
        &config.device,
        BusOptions {
            subscriptions: Vec::new(),
            presence_topic: Some(config.liveness_topic.clone()),
        },
    )?;

    // Backend bus: inbound only
    let (backend, backend_driver) = BusClient::connect(
        BusRole::Backend,
        &config.backend,
        BusOptions {
            subscriptions: vec![router.subscription()],
            presence_topic: None,
        },
    )?;

    let relay = Relay::new(
        router,
        Transformer::new(config.display.clone()),
        Arc::new(device.clone()),
        &config.device.namespace,
    )
    .with_metrics(metrics.clone());
    let handler: Arc<dyn MessageHandler> = Arc::new(relay);

    let (report_tx, report_rx) = mpsc::channel(32);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let device_handle = tokio::spawn(device_driver.run(None, report_tx.clone(), shutdown_rx.clone()));
    let backend_handle = tokio::spawn(backend_driver.run(Some(handler), report_tx, shutdown_rx.clone()));

    let probe = Arc::new(TcpProbe::new(Duration::from_millis(
        config.supervisor.probe_timeout_ms,
    )));
    let mut supervisor = Supervisor::new(config.supervisor.clone(), probe).with_metrics(metrics.clone());
    match CommandRestarter::from_command(&config.supervisor.restart_command) {
        Some(restarter) => supervisor = supervisor.with_restarter(Arc::new(restarter)),
        None => info!("No broker restart command configured"),
    }
    supervisor.watch(Arc::new(backend.clone()));
    supervisor.watch(Arc::new(device.clone()));
    let supervisor_handle = tokio::spawn(supervisor.run(report_rx, shutdown_rx));

    info!("Tool relay running");

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    // Graceful shutdown: flag first so disconnects are reported as expected
    let _ = shutdown_tx.send(true);
    for client in [&backend, &device] {
        if let Err(e) = client.shutdown().await {
            warn!(role = %client.role(), error = %e, "Disconnect failed");
        }
    }

    for (role, handle) in [(BusRole::Backend, backend_handle), (BusRole::Device, device_handle)] {
        if tokio::time::timeout(DRIVER_STOP_TIMEOUT, handle).await.is_err() {
            warn!(role = %role, "Bus driver did not stop in time");
        }
    }
    supervisor_handle.abort();

    let snapshot = metrics.snapshot();
    info!(
        received = snapshot.received,
        relayed = snapshot.relayed,
        ignored = snapshot.ignored,
        dropped = snapshot.dropped,
        publish_failures = snapshot.publish_failures,
        "Tool relay stopped"
    );

    Ok(())
}

/// First CLI argument, then `TOOL_RELAY_CONFIG`, then `tool-relay.toml`
/// in the working directory if present.
fn config_path() -> Option<PathBuf> {
    if let Some(arg) = std::env::args_os().nth(1) {
        return Some(PathBuf::from(arg));
    }
    if let Some(path) = std::env::var_os("TOOL_RELAY_CONFIG") {
        return Some(PathBuf::from(path));
    }
    let default = PathBuf::from(DEFAULT_CONFIG_FILE);
    default.exists().then_some(default)
}
