// src/persist/store.rs
//! External append-only store interface

use crate::persist::memory_store::MemoryChangeStore;
use crate::persist::sql_store::SqlChangeStore;
use crate::pipeline::events::MessageEvent;
use crate::utils::config::StoreConfig;
use crate::utils::errors::{MirrorError, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use tracing::info;

/// URL scheme selecting the in-process store
pub const MEMORY_URL: &str = "memory://";

/// Append-only destination for change payloads and application events
#[async_trait]
pub trait ChangeStore: Send + Sync {
    /// Short backend name for logs
    fn backend(&self) -> &'static str;

    /// Check the store is reachable
    async fn ping(&self) -> Result<()>;

    /// Append one serialized change record
    async fn append_change(&self, payload: &str, created_at: DateTime<Utc>) -> Result<()>;

    /// Append one application message
    async fn append_message(&self, message: &MessageEvent, created_at: DateTime<Utc>) -> Result<()>;

    /// Append one JSON log entry or serialized application event
    async fn append_log(&self, entry: &str, created_at: DateTime<Utc>) -> Result<()>;

    /// Most recent change rows, oldest first
    async fn recent_changes(&self, limit: usize) -> Result<Vec<StoredChange>>;

    /// Most recent message rows, oldest first
    async fn recent_messages(&self, limit: usize) -> Result<Vec<StoredMessage>>;

    async fn recent_logs(&self, limit: usize) -> Result<Vec<StoredLog>>;
}

/// A persisted change row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredChange {
    pub id: i64,
    pub payload: String,
    pub created_at: String,
}

/// A persisted message row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: i64,
    pub reference: String,
    pub body: String,
    pub created_at: String,
}

/// A persisted log row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredLog {
    pub id: i64,
    pub entry: String,
    pub created_at: String,
}

/// Open the store named by `config.url`
///
/// Fails with [`MirrorError::Connection`] if the store cannot be reached;
/// there is no retry.
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn ChangeStore>> {
    let store: Arc<dyn ChangeStore> = if config.url.starts_with(MEMORY_URL) {
        Arc::new(MemoryChangeStore::new())
    } else {
        Arc::new(SqlChangeStore::connect(config).await?)
    };

    store.ping().await.map_err(|e| match e {
        MirrorError::Connection(_) => e,
        other => MirrorError::Connection(other.to_string()),
    })?;

    info!(backend = store.backend(), "Change store connected");

    Ok(store)
}

/// Timestamp text written to the store
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}
