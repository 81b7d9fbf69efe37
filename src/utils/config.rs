// src/utils/config.rs
//! Layered configuration
//!
//! Sources, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. Optional file `mirrorlite.{toml,yaml,json}` (or `$MIRRORLITE_CONFIG`)
//! 3. Environment variables `MIRRORLITE__<SECTION>__<KEY>`
//!
//! Example: `MIRRORLITE__STORE__URL=postgres://user:pw@localhost/mirror`

use crate::utils::errors::{MirrorError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "MIRRORLITE";
const CONFIG_PATH_VAR: &str = "MIRRORLITE_CONFIG";
const DEFAULT_CONFIG_NAME: &str = "mirrorlite";

/// Default queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub pipeline: PipelineConfig,
    pub store: StoreConfig,
    pub embedded: EmbeddedConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// What happens to records still buffered when the pipeline stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownPolicy {
    /// Exit at once; buffered records are lost
    #[default]
    Discard,

    /// Persist whatever was buffered when cancellation arrived, then exit
    Drain,
}

/// Queue and shutdown settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Fixed capacity of the change queue
    pub queue_capacity: usize,

    /// Shutdown behavior for buffered records
    pub shutdown: ShutdownPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            shutdown: ShutdownPolicy::Discard,
        }
    }
}

/// External store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// `postgres://...`, `sqlite:...` or `memory://`
    pub url: String,

    /// Pool size
    pub max_connections: u32,

    /// Pool acquire timeout (seconds)
    pub acquire_timeout_secs: u64,

    /// Run `CREATE TABLE IF NOT EXISTS` on connect
    pub create_schema: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 2,
            acquire_timeout_secs: 10,
            create_schema: true,
        }
    }
}

/// Embedded SQLite settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddedConfig {
    /// Database file observed by the capture hook
    pub path: PathBuf,

    /// SQLite busy timeout (milliseconds)
    pub busy_timeout_ms: u64,

    /// Enable `PRAGMA foreign_keys`
    pub foreign_keys: bool,
}

impl Default for EmbeddedConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("mirror.db"),
            busy_timeout_ms: 5000,
            foreign_keys: true,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// Prometheus exporter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: "0.0.0.0:9464".to_string(),
        }
    }
}

impl MirrorConfig {
    /// Load from the default file location plus environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_NAME.to_string());
        Self::load_from(Path::new(&path), true)
    }

    /// Load from an explicit file (no environment overlay)
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::load_from(path, false)
    }

    fn load_from(path: &Path, with_env: bool) -> Result<Self> {
        let mut builder = Config::builder().add_source(File::from(path).required(false));

        if with_env {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config: MirrorConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.queue_capacity == 0 {
            return Err(MirrorError::Config(
                "pipeline.queue_capacity must be greater than 0".to_string(),
            ));
        }

        if self.store.url.trim().is_empty() {
            return Err(MirrorError::Config("store.url is required".to_string()));
        }

        if self.store.max_connections == 0 {
            return Err(MirrorError::Config(
                "store.max_connections must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = MirrorConfig::default();
        assert_eq!(config.pipeline.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.pipeline.shutdown, ShutdownPolicy::Discard);
        assert_eq!(config.embedded.busy_timeout_ms, 5000);
        assert!(config.embedded.foreign_keys);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_validate_requires_store_url() {
        let config = MirrorConfig::default();
        assert!(matches!(config.validate(), Err(MirrorError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = MirrorConfig::default();
        config.store.url = "memory://".to_string();
        config.pipeline.queue_capacity = 0;
        assert!(config.validate().is_err());

        config.pipeline.queue_capacity = 2;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[pipeline]
queue_capacity = 64
shutdown = "drain"

[store]
url = "sqlite::memory:"
max_connections = 1
"#
        )
        .unwrap();

        let config = MirrorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.pipeline.queue_capacity, 64);
        assert_eq!(config.pipeline.shutdown, ShutdownPolicy::Drain);
        assert_eq!(config.store.url, "sqlite::memory:");
        assert_eq!(config.store.max_connections, 1);
        // untouched sections keep their defaults
        assert_eq!(config.embedded.path, PathBuf::from("mirror.db"));
    }
}
