// src/persist/mod.rs
//! Durable forwarding of captured changes
//!
//! - **Store**: append-only destination trait and URL-based selection
//! - **SQL Store**: PostgreSQL / SQLite through a sqlx pool
//! - **Memory Store**: in-process store for dry runs
//! - **Persister**: single background consumer of the change queue
//!
//! No retries happen at this layer. A record whose write fails is logged,
//! counted and dropped.

pub mod memory_store;
pub mod persister;
pub mod sql_store;
pub mod store;

// Re-export commonly used types
pub use memory_store::{MemoryChangeStore, StoreGate};
pub use persister::{Persister, PersisterReport, PersisterState};
pub use sql_store::{Dialect, SqlChangeStore};
pub use store::{connect, ChangeStore, StoredChange, StoredLog, StoredMessage};
