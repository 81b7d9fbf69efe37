// src/main.rs
//! Mirrorlite daemon
//!
//! Opens the embedded database with change capture attached and forwards
//! every captured write to the configured store until Ctrl+C.
//!
//! SQLite hooks only see connections opened in this process, so writes from
//! other processes on the same file are never captured. The binary is the
//! wiring for an in-process writer; applications embed the library and
//! write through the connection returned by `open_embedded`.

use anyhow::{Context, Result};
use mirrorlite::observability::{init_metrics, init_tracing};
use mirrorlite::persist::store;
use mirrorlite::pipeline::LifecycleController;
use mirrorlite::utils::config::MirrorConfig;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = MirrorConfig::load().context("Failed to load configuration")?;

    // Initialize observability (tracing, metrics)
    init_tracing(&config.logging)?;
    init_metrics(&config.metrics)?;

    info!("Starting mirrorlite v{}", mirrorlite::VERSION);

    // The pipeline must not start against an unreachable store
    let store = store::connect(&config.store)
        .await
        .context("Change store unreachable")?;

    let shutdown = CancellationToken::new();
    let controller = LifecycleController::start(&config.pipeline, store, &shutdown)?;

    // Persister is running; only now accept writes
    let embedded = controller
        .open_embedded(&config.embedded)
        .context("Failed to open embedded database")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install CTRL+C signal handler")?;
    info!("Received shutdown signal, cleaning up...");

    if let Err((_, e)) = embedded.close() {
        error!("Failed to close embedded database: {}", e);
    }

    let report = controller.stop().await?;
    info!(
        persisted = report.persisted,
        discarded = report.discarded,
        "Mirrorlite stopped"
    );

    Ok(())
}
