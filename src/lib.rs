// src/lib.rs
//! Mirrorlite change capture library
//!
//! Captures row-level writes on an embedded SQLite database and forwards
//! them to an external append-only store without ever blocking the writer.
//!
//! # Architecture
//!
//! The library is structured into a few modules:
//!
//! - **capture**: change records, bounded queue, write hook, registration
//! - **persist**: store backends and the background persister
//! - **pipeline**: lifecycle controller and application event dispatch
//! - **observability**: tracing and metrics setup
//! - **utils**: configuration and errors
//!
//! ```text
//! SQLite ─→ HookCapturer ─→ ChangeQueue ─→ Persister ─→ ChangeStore
//! ```
//!
//! Delivery is best effort: a full queue drops the newest record, a failed
//! write drops that record, and nothing is retried.

// Public module exports
pub mod capture;
pub mod observability;
pub mod persist;
pub mod pipeline;
pub mod utils;

// Re-export commonly used types
pub use capture::{ChangeQueue, ChangeRecord, HookCapturer, OpKind, WriteObserver};
pub use persist::{ChangeStore, Persister, PersisterReport, PersisterState};
pub use pipeline::{AppEvent, EventDispatcher, LifecycleController, MessageEvent};
pub use utils::config::MirrorConfig;
pub use utils::errors::{MirrorError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
