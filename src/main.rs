use std::sync::Arc;

use repo_mirror::register_custom_metrics;
use repo_mirror::Error;
use repo_mirror::MemCoordinationStore;
use repo_mirror::MirrorCache;
use repo_mirror::MirrorConfig;
use repo_mirror::Partition;
use repo_mirror::Result;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    init_observability();

    let config = MirrorConfig::new()?.validate()?;
    info!("Loaded configuration: {:?}", config);

    if let Err(e) = register_custom_metrics(prometheus::default_registry()) {
        warn!("metrics already registered: {:?}", e);
    }

    // Initializing Shutdown Signal
    let (graceful_tx, mut graceful_rx) = watch::channel(());

    let cache = MirrorCache::new(config, Arc::new(MemCoordinationStore::new()))?;
    cache.ready().await?;
    for partition in Partition::ALL {
        info!(
            %partition,
            repositories = cache.list_repository(partition).len(),
            "partition mirrored"
        );
    }

    info!("Application started. Waiting for CTRL+C signal...");
    tokio::spawn(async {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("Failed to shutdown: {:?}", e);
        }
    });

    if graceful_rx.changed().await.is_err() {
        warn!("shutdown signal sender dropped");
    }
    cache.shutdown().await?;

    info!("Exiting program.");
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
        Error::SignalSenderClosed(format!("Failed to send shutdown signal: {}", e))
    })?;

    info!("Shutdown signal sent");
    Ok(())
}

fn init_observability() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}
