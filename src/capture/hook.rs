// src/capture/hook.rs
//! Write hook capturer
//!
//! Runs inline on the embedded engine's write path. Everything here must
//! return promptly: build the record, try to enqueue, count the outcome.
//! A full queue never reaches the writer; the record is dropped and logged.

use crate::capture::queue::ChangeQueue;
use crate::capture::record::{ChangeRecord, OpKind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

/// Receives one notification per row-level write
pub trait WriteObserver: Send + Sync {
    fn on_write(&self, op: OpKind, db_name: &str, table: &str, row_id: i64);
}

/// Observer that turns writes into queued change records
pub struct HookCapturer {
    queue: Arc<ChangeQueue>,
    captured: AtomicU64,
    dropped: AtomicU64,
    unrecognized: AtomicU64,
}

impl HookCapturer {
    /// Create a capturer feeding `queue`
    pub fn new(queue: Arc<ChangeQueue>) -> Self {
        Self {
            queue,
            captured: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            unrecognized: AtomicU64::new(0),
        }
    }

    /// Entry point for hooks that deliver a raw integer action code
    pub fn on_raw_write(&self, code: i32, db_name: &str, table: &str, row_id: i64) {
        match OpKind::from_code(code) {
            Some(op) => self.on_write(op, db_name, table, row_id),
            None => {
                self.unrecognized.fetch_add(1, Ordering::Relaxed);
                warn!(code, table, row_id, "Ignoring write with unrecognized op code");
            }
        }
    }

    /// Queue this capturer feeds
    pub fn queue(&self) -> &Arc<ChangeQueue> {
        &self.queue
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            captured: self.captured.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            unrecognized: self.unrecognized.load(Ordering::Relaxed),
        }
    }
}

impl WriteObserver for HookCapturer {
    fn on_write(&self, op: OpKind, db_name: &str, table: &str, row_id: i64) {
        let record = ChangeRecord::capture(op, db_name, table, row_id);

        if self.queue.try_enqueue(record) {
            self.captured.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("mirrorlite_changes_captured_total").increment(1);
            trace!(%op, db_name, table, row_id, "Captured change");
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("mirrorlite_changes_dropped_total").increment(1);
            warn!(%op, db_name, table, row_id, "Change queue full, dropping record");
        }
    }
}

/// Capture counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Records accepted by the queue
    pub captured: u64,

    /// Records dropped because the queue was full
    pub dropped: u64,

    /// Writes with an op code that maps to no [`OpKind`]
    pub unrecognized: u64,
}
