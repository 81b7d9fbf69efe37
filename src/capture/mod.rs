// src/capture/mod.rs
//! Change capture on the embedded database
//!
//! - **Record**: immutable description of one row-level write
//! - **Queue**: bounded lock-free buffer, drop-new on overflow
//! - **Hook**: write observer that records and enqueues without blocking
//! - **Embedded**: per-connection hook registration for SQLite
//!
//! # Architecture
//!
//! ```text
//! SQLite write ─→ update_hook ─→ HookCapturer ─→ ChangeQueue ─→ Persister
//!   (caller thread, synchronous)      try_enqueue (O(1))        (tokio task)
//! ```

pub mod embedded;
pub mod hook;
pub mod queue;
pub mod record;

// Re-export commonly used types
pub use embedded::{open_embedded, register};
pub use hook::{CaptureStats, HookCapturer, WriteObserver};
pub use queue::{ChangeQueue, QueueStats};
pub use record::{ChangeRecord, OpKind};
