use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use transfer_queue::api::create_api_server;
use transfer_queue::config::QueueConfig;
use transfer_queue::coordinator::{LoggingListener, TransferCoordinator};
use transfer_queue::executor::LocalFsExecutor;
use transfer_queue::scheduler::QueueScheduler;
use transfer_queue::store::TransferStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = QueueConfig::load(config_path.as_deref()).context("loading configuration")?;
    config
        .prepare_dirs()
        .context("creating data directories")?;

    tracing::info!("Queue database: {}", config.database_url);
    tracing::info!("Grid root: {:?}", config.grid_root);

    if config.metrics_enabled {
        transfer_queue::metrics::install_recorder().context("installing metrics recorder")?;
    }

    let store = TransferStore::new(&config.database_url)
        .await
        .context("opening queue database")?;
    let executor = LocalFsExecutor::new(config.grid_root.clone());
    let coordinator = TransferCoordinator::new(store, Arc::new(executor));
    coordinator.register_listener(Arc::new(LoggingListener));

    if config.start_paused {
        coordinator.pause().await;
    }
    let recovered = coordinator
        .recover()
        .await
        .context("recovering interrupted transfers")?;
    tracing::info!("Recovered {} interrupted transfers", recovered);

    coordinator
        .process_next_if_idle()
        .await
        .context("starting the queue")?;

    let scheduler = QueueScheduler::spawn(coordinator.clone(), config.scheduler_interval());
    let app = create_api_server(coordinator.clone());

    let listener = tokio::net::TcpListener::bind(config.api_addr)
        .await
        .with_context(|| format!("binding {}", config.api_addr))?;

    tracing::info!("Transfer queue listening on http://{}", config.api_addr);
    tracing::info!("  REST API:  http://{}/api/v1/transfers", config.api_addr);
    tracing::info!("  Status:    http://{}/api/v1/status", config.api_addr);
    tracing::info!("  WebSocket: ws://{}/ws", config.api_addr);
    tracing::info!("  Metrics:   http://{}/metrics", config.api_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
        .context("serving API")?;

    tracing::info!("Shutting down");
    scheduler.shutdown().await;
    coordinator.store().close().await;

    Ok(())
}
