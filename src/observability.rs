// src/observability.rs
//! Logging and metrics setup
//!
//! Counters emitted by the pipeline:
//!
//! - `mirrorlite_changes_captured_total`
//! - `mirrorlite_changes_dropped_total`
//! - `mirrorlite_changes_persisted_total`
//! - `mirrorlite_persist_failures_total{stage}`
//! - `mirrorlite_queue_depth` (gauge)

use crate::utils::config::{LoggingConfig, MetricsConfig};
use crate::utils::errors::{MirrorError, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over `config.filter`.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| MirrorError::Config(format!("Invalid log filter: {}", e)))?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };

    result.map_err(|e| MirrorError::Config(format!("Failed to install subscriber: {}", e)))
}

/// Start the Prometheus exporter if enabled
pub fn init_metrics(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .listen
        .parse()
        .map_err(|e| MirrorError::Config(format!("Invalid metrics address {}: {}", config.listen, e)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MirrorError::Config(format!("Failed to start metrics exporter: {}", e)))?;

    info!("Metrics exporter listening on {}", addr);
    Ok(())
}
