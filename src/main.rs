use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

use checkwatch::{api, utils, Worker, WorkerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    utils::setup_console();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::INFO.into()))
        .with_ansi(true)
        .init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.json".to_string());
    let config = WorkerConfig::load(&config_path)?;
    utils::ensure_dirs(&config)?;

    let worker = Arc::new(Worker::from_config(config.clone())?);

    if let Some(port) = config.api_port {
        let store = worker.store();
        tokio::spawn(async move {
            if let Err(e) = api::start_server(port, store).await {
                tracing::error!("Status API failed: {}", e);
            }
        });
    }

    let handle = Arc::clone(&worker).run();

    signal::ctrl_c().await?;
    info!("Shutdown signal received. Waiting for the current cycles to finish...");
    handle.shutdown().await;

    Ok(())
}
