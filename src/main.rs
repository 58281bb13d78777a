use std::path::Path;
use std::sync::Arc;

use mqtt_shepherd::start_server;
use mqtt_shepherd::DeviceStore;
use mqtt_shepherd::Error;
use mqtt_shepherd::GatewayBuilder;
use mqtt_shepherd::MemDeviceStore;
use mqtt_shepherd::MqttTransport;
use mqtt_shepherd::Result;
use mqtt_shepherd::ShepherdConfig;
use mqtt_shepherd::SledDeviceStore;
use mqtt_shepherd::StorageError;
use mqtt_shepherd::TransportError;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let mut config = ShepherdConfig::new()?;
    if let Some(path) = std::env::args().nth(1) {
        config = config.with_override_config(&path)?;
    }
    let config = config.validate()?;

    // Initializing Logs
    let _guard = init_observability(&config.log_dir)?;

    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());

    if config.monitoring.metrics_enabled {
        tokio::spawn(start_server(config.monitoring.metrics_addr, graceful_rx.clone()));
    }

    let store: Arc<dyn DeviceStore> = if config.storage.in_memory {
        Arc::new(MemDeviceStore::new())
    } else {
        Arc::new(SledDeviceStore::open(&config.storage.db_path)?)
    };

    let (event_tx, event_rx) = mpsc::channel(config.broker.channel_capacity);
    let transport = Arc::new(MqttTransport::connect(
        &config.gateway.client_id,
        &config.broker,
        event_tx,
    ));

    let mut node = GatewayBuilder::new(config.gateway.clone(), transport, event_rx)
        .store(store)
        .build();
    node.start().await?;

    let mut events = node.gateway().subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => info!(target: "events", "{:?}", event),
                Err(RecvError::Lagged(skipped)) => warn!("event log lagged by {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    info!("Gateway started. Waiting for CTRL+C signal...");
    // Listen on Shutdown Signal
    tokio::spawn(async {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("Failed to shutdown: {:?}", e);
        }
    });

    if let Err(e) = node.run(graceful_rx).await {
        error!("gateway stops: {:?}", e);
    }

    println!("Exiting program.");
    Ok(())
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt()).map_err(|e| Error::Fatal(e.to_string()))?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(|e| Error::Fatal(e.to_string()))?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }

    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        TransportError::SignalSendFailed(format!("Failed to send shutdown signal: {}", e))
    })?;

    info!("Shutdown completed");
    Ok(())
}

pub fn init_observability(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir).map_err(StorageError::from)?;
    let log_file = tracing_appender::rolling::never(log_dir, "shepherd.log");

    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(guard)
}
