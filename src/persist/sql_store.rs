// src/persist/sql_store.rs
//! SQL change store (PostgreSQL or SQLite through sqlx `Any`)
//!
//! Schema (PostgreSQL shown; SQLite uses INTEGER/TEXT equivalents):
//!
//! ```sql
//! CREATE TABLE sqlite_changes (
//!   id BIGSERIAL PRIMARY KEY,
//!   payload TEXT NOT NULL,           -- canonical JSON change record
//!   created_at TIMESTAMPTZ NOT NULL
//! );
//! CREATE TABLE messages (
//!   id BIGSERIAL PRIMARY KEY,
//!   ref TEXT NOT NULL,
//!   mensagem TEXT NOT NULL,
//!   created_at TIMESTAMPTZ NOT NULL
//! );
//! CREATE TABLE logs (
//!   id BIGSERIAL PRIMARY KEY,
//!   log TEXT NOT NULL,               -- JSON log entry or application event
//!   created_at TIMESTAMPTZ NOT NULL
//! );
//! ```
//!
//! SQLite reserves every table name starting with `sqlite_`, so the change
//! table is `changes` on that backend.
//!
//! The `Any` driver has no chrono mapping, so timestamps are bound as RFC 3339
//! text and cast on the PostgreSQL side.

use crate::persist::store::{
    format_timestamp, ChangeStore, StoredChange, StoredLog, StoredMessage,
};
use crate::pipeline::events::MessageEvent;
use crate::utils::config::StoreConfig;
use crate::utils::errors::{MirrorError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::any::AnyPoolOptions;
use sqlx::{AnyPool, Row};
use std::sync::Once;
use std::time::Duration;
use tracing::{debug, info};

static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

/// SQL flavor, picked from the URL scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    pub fn from_url(url: &str) -> Result<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Dialect::Postgres)
        } else if url.starts_with("sqlite:") {
            Ok(Dialect::Sqlite)
        } else {
            Err(MirrorError::Connection(format!(
                "Unsupported store url scheme: {}",
                url.split(':').next().unwrap_or_default()
            )))
        }
    }

    /// Table holding change payloads
    pub fn changes_table(&self) -> &'static str {
        match self {
            Dialect::Postgres => "sqlite_changes",
            Dialect::Sqlite => "changes",
        }
    }

    fn schema(&self) -> [&'static str; 3] {
        match self {
            Dialect::Postgres => [
                r#"
                CREATE TABLE IF NOT EXISTS sqlite_changes (
                    id BIGSERIAL PRIMARY KEY,
                    payload TEXT NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS messages (
                    id BIGSERIAL PRIMARY KEY,
                    ref TEXT NOT NULL,
                    mensagem TEXT NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS logs (
                    id BIGSERIAL PRIMARY KEY,
                    log TEXT NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL
                )
                "#,
            ],
            Dialect::Sqlite => [
                r#"
                CREATE TABLE IF NOT EXISTS changes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    payload TEXT NOT NULL,
                    created_at TEXT NOT NULL
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS messages (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    ref TEXT NOT NULL,
                    mensagem TEXT NOT NULL,
                    created_at TEXT NOT NULL
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    log TEXT NOT NULL,
                    created_at TEXT NOT NULL
                )
                "#,
            ],
        }
    }

    fn insert_change(&self) -> &'static str {
        match self {
            Dialect::Postgres => {
                "INSERT INTO sqlite_changes (payload, created_at) VALUES ($1, CAST($2 AS TIMESTAMPTZ))"
            }
            Dialect::Sqlite => "INSERT INTO changes (payload, created_at) VALUES (?, ?)",
        }
    }

    fn insert_message(&self) -> &'static str {
        match self {
            Dialect::Postgres => {
                "INSERT INTO messages (ref, mensagem, created_at) VALUES ($1, $2, CAST($3 AS TIMESTAMPTZ))"
            }
            Dialect::Sqlite => "INSERT INTO messages (ref, mensagem, created_at) VALUES (?, ?, ?)",
        }
    }

    fn insert_log(&self) -> &'static str {
        match self {
            Dialect::Postgres => {
                "INSERT INTO logs (log, created_at) VALUES ($1, CAST($2 AS TIMESTAMPTZ))"
            }
            Dialect::Sqlite => "INSERT INTO logs (log, created_at) VALUES (?, ?)",
        }
    }

    fn select_changes(&self) -> &'static str {
        match self {
            Dialect::Postgres => {
                "SELECT id, payload, CAST(created_at AS TEXT) FROM sqlite_changes ORDER BY id DESC LIMIT $1"
            }
            Dialect::Sqlite => "SELECT id, payload, created_at FROM changes ORDER BY id DESC LIMIT ?",
        }
    }

    fn select_messages(&self) -> &'static str {
        match self {
            Dialect::Postgres => {
                "SELECT id, ref, mensagem, CAST(created_at AS TEXT) FROM messages ORDER BY id DESC LIMIT $1"
            }
            Dialect::Sqlite => {
                "SELECT id, ref, mensagem, created_at FROM messages ORDER BY id DESC LIMIT ?"
            }
        }
    }

    fn select_logs(&self) -> &'static str {
        match self {
            Dialect::Postgres => {
                "SELECT id, log, CAST(created_at AS TEXT) FROM logs ORDER BY id DESC LIMIT $1"
            }
            Dialect::Sqlite => "SELECT id, log, created_at FROM logs ORDER BY id DESC LIMIT ?",
        }
    }
}

/// Change store backed by a sqlx connection pool
pub struct SqlChangeStore {
    pool: AnyPool,
    dialect: Dialect,
}

impl SqlChangeStore {
    /// Connect, verify reachability and prepare the schema
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        install_drivers();

        let dialect = Dialect::from_url(&config.url)?;

        // every pooled connection to an in-memory SQLite database is a
        // separate database, so keep exactly one alive
        let in_memory = dialect == Dialect::Sqlite && config.url.contains(":memory:");

        let mut options = AnyPoolOptions::new()
            .max_connections(if in_memory { 1 } else { config.max_connections })
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs));
        if in_memory {
            options = options.min_connections(1).idle_timeout(None).max_lifetime(None);
        }

        let pool = options
            .connect(&config.url)
            .await
            .map_err(|e| MirrorError::Connection(e.to_string()))?;

        let store = Self { pool, dialect };
        store.ping().await?;

        if config.create_schema {
            store.init_schema().await?;
        }

        info!(
            dialect = ?store.dialect,
            changes_table = store.dialect.changes_table(),
            "SQL change store ready"
        );

        Ok(store)
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn init_schema(&self) -> Result<()> {
        for sql in self.dialect.schema() {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| MirrorError::Connection(format!("Schema creation failed: {}", e)))?;
        }

        debug!("Store schema ensured");
        Ok(())
    }
}

#[async_trait]
impl ChangeStore for SqlChangeStore {
    fn backend(&self) -> &'static str {
        match self.dialect {
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
        }
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| MirrorError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn append_change(&self, payload: &str, created_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(self.dialect.insert_change())
            .bind(payload)
            .bind(format_timestamp(created_at))
            .execute(&self.pool)
            .await
            .map_err(|e| MirrorError::Persist(e.to_string()))?;
        Ok(())
    }

    async fn append_message(&self, message: &MessageEvent, created_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(self.dialect.insert_message())
            .bind(message.reference.as_str())
            .bind(message.body.as_str())
            .bind(format_timestamp(created_at))
            .execute(&self.pool)
            .await
            .map_err(|e| MirrorError::Persist(e.to_string()))?;
        Ok(())
    }

    async fn append_log(&self, entry: &str, created_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(self.dialect.insert_log())
            .bind(entry)
            .bind(format_timestamp(created_at))
            .execute(&self.pool)
            .await
            .map_err(|e| MirrorError::Persist(e.to_string()))?;
        Ok(())
    }

    async fn recent_changes(&self, limit: usize) -> Result<Vec<StoredChange>> {
        let rows = sqlx::query(self.dialect.select_changes())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MirrorError::Persist(e.to_string()))?;

        let mut changes = rows
            .iter()
            .map(|row| -> std::result::Result<StoredChange, sqlx::Error> {
                Ok(StoredChange {
                    id: row.try_get(0)?,
                    payload: row.try_get(1)?,
                    created_at: row.try_get(2)?,
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| MirrorError::Persist(e.to_string()))?;

        changes.reverse();
        Ok(changes)
    }

    async fn recent_messages(&self, limit: usize) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query(self.dialect.select_messages())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MirrorError::Persist(e.to_string()))?;

        let mut messages = rows
            .iter()
            .map(|row| -> std::result::Result<StoredMessage, sqlx::Error> {
                Ok(StoredMessage {
                    id: row.try_get(0)?,
                    reference: row.try_get(1)?,
                    body: row.try_get(2)?,
                    created_at: row.try_get(3)?,
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| MirrorError::Persist(e.to_string()))?;

        messages.reverse();
        Ok(messages)
    }

    async fn recent_logs(&self, limit: usize) -> Result<Vec<StoredLog>> {
        let rows = sqlx::query(self.dialect.select_logs())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MirrorError::Persist(e.to_string()))?;

        let mut logs = rows
            .iter()
            .map(|row| -> std::result::Result<StoredLog, sqlx::Error> {
                Ok(StoredLog {
                    id: row.try_get(0)?,
                    entry: row.try_get(1)?,
                    created_at: row.try_get(2)?,
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| MirrorError::Persist(e.to_string()))?;

        logs.reverse();
        Ok(logs)
    }
}
