// src/persist/persister.rs
//! Background persister
//!
//! Single consumer of the change queue. Each record is serialized and written
//! on its own; failures are logged and the record is gone.
//!
//! # States
//!
//! ```text
//!          record                 write done
//!  Idle ────────────→ Processing ────────────→ Idle
//!   │
//!   │ cancel observed
//!   ▼
//!  Stopped
//! ```
//!
//! Cancellation is only checked while idle, so a write that has started
//! always finishes (or fails) before the loop exits.

use crate::capture::queue::ChangeQueue;
use crate::capture::record::ChangeRecord;
use crate::persist::store::ChangeStore;
use crate::utils::config::ShutdownPolicy;
use crate::utils::errors::{MirrorError, Result};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Persister lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersisterState {
    /// Waiting at the queue
    Idle,

    /// Writing one record
    Processing,

    /// Loop has exited
    Stopped,
}

/// Outcome counters, returned when the persister exits
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersisterReport {
    /// Records written to the store
    pub persisted: u64,

    /// Records dropped before reaching the store
    pub serialize_failures: u64,

    /// Records dropped after a failed store write
    pub persist_failures: u64,

    /// Records written after cancellation under [`ShutdownPolicy::Drain`]
    pub drained: u64,

    /// Records left in the queue at exit
    pub discarded: u64,
}

/// Drains the change queue into a [`ChangeStore`]
pub struct Persister {
    queue: Arc<ChangeQueue>,
    store: Arc<dyn ChangeStore>,
    policy: ShutdownPolicy,
    state: watch::Sender<PersisterState>,
    report: PersisterReport,
}

impl Persister {
    /// Create a persister and a receiver for its state
    pub fn new(
        queue: Arc<ChangeQueue>,
        store: Arc<dyn ChangeStore>,
        policy: ShutdownPolicy,
    ) -> (Self, watch::Receiver<PersisterState>) {
        let (state, state_rx) = watch::channel(PersisterState::Idle);

        let persister = Self {
            queue,
            store,
            policy,
            state,
            report: PersisterReport::default(),
        };

        (persister, state_rx)
    }

    /// Run on a dedicated tokio task
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<PersisterReport> {
        tokio::spawn(self.run(cancel))
    }

    /// Consume records until `cancel` fires
    pub async fn run(mut self, cancel: CancellationToken) -> PersisterReport {
        info!(
            backend = self.store.backend(),
            capacity = self.queue.capacity(),
            policy = ?self.policy,
            "Persister started"
        );

        while let Some(record) = self.queue.dequeue(&cancel).await {
            self.process(record).await;
        }

        match self.policy {
            ShutdownPolicy::Drain => {
                // bounded by what was buffered at cancellation; writers may still be pushing
                let pending = self.queue.len();
                for _ in 0..pending {
                    let Some(record) = self.queue.try_dequeue() else {
                        break;
                    };
                    self.process(record).await;
                    self.report.drained += 1;
                }
            }
            ShutdownPolicy::Discard => {}
        }

        self.report.discarded = self.queue.len() as u64;
        if self.report.discarded > 0 {
            warn!(
                discarded = self.report.discarded,
                "Persister stopped with records still buffered"
            );
        }

        self.state.send_replace(PersisterState::Stopped);
        info!(report = ?self.report, "Persister stopped");

        self.report
    }

    async fn process(&mut self, record: ChangeRecord) {
        self.state.send_replace(PersisterState::Processing);

        match self.persist(&record).await {
            Ok(()) => {
                self.report.persisted += 1;
                metrics::counter!("mirrorlite_changes_persisted_total").increment(1);
                debug!(table = record.table(), row_id = record.row_id(), "Persisted change");
            }
            Err(e @ MirrorError::Serialization(_)) => {
                self.report.serialize_failures += 1;
                metrics::counter!("mirrorlite_persist_failures_total", "stage" => "serialize")
                    .increment(1);
                error!(error = %e, table = record.table(), row_id = record.row_id(), "Dropping change");
            }
            Err(e) => {
                self.report.persist_failures += 1;
                metrics::counter!("mirrorlite_persist_failures_total", "stage" => "store")
                    .increment(1);
                error!(error = %e, table = record.table(), row_id = record.row_id(), "Failed to persist change");
            }
        }

        metrics::gauge!("mirrorlite_queue_depth").set(self.queue.len() as f64);
        self.state.send_replace(PersisterState::Idle);
    }

    async fn persist(&self, record: &ChangeRecord) -> Result<()> {
        let payload = record.to_payload()?;
        self.store.append_change(&payload, Utc::now()).await
    }
}
