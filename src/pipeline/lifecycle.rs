// src/pipeline/lifecycle.rs
//! Pipeline lifecycle
//!
//! The controller owns the queue, the capturer and the persister task.
//! Start it before any observed connection accepts writes; [`stop`] cancels
//! the persister at its wait point and joins the task.
//!
//! [`stop`]: LifecycleController::stop

use crate::capture::embedded;
use crate::capture::hook::{CaptureStats, HookCapturer};
use crate::capture::queue::{ChangeQueue, QueueStats};
use crate::persist::persister::{Persister, PersisterReport, PersisterState};
use crate::persist::store::ChangeStore;
use crate::pipeline::events::EventDispatcher;
use crate::utils::config::{EmbeddedConfig, PipelineConfig};
use crate::utils::errors::{MirrorError, Result};
use rusqlite::Connection;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Owner of the running capture pipeline
pub struct LifecycleController {
    queue: Arc<ChangeQueue>,
    capturer: Arc<HookCapturer>,
    store: Arc<dyn ChangeStore>,
    cancel: CancellationToken,
    state: watch::Receiver<PersisterState>,
    handle: Option<JoinHandle<PersisterReport>>,
}

impl LifecycleController {
    /// Build the queue and spawn the persister
    ///
    /// The persister runs under a child of `parent`, so cancelling `parent`
    /// stops it as well. Must be called from within a tokio runtime.
    pub fn start(
        config: &PipelineConfig,
        store: Arc<dyn ChangeStore>,
        parent: &CancellationToken,
    ) -> Result<Self> {
        if config.queue_capacity == 0 {
            return Err(MirrorError::Config(
                "queue capacity must be greater than 0".to_string(),
            ));
        }

        let queue = Arc::new(ChangeQueue::new(config.queue_capacity));
        let capturer = Arc::new(HookCapturer::new(Arc::clone(&queue)));
        let cancel = parent.child_token();

        let (persister, state) =
            Persister::new(Arc::clone(&queue), Arc::clone(&store), config.shutdown);
        let handle = persister.spawn(cancel.clone());

        info!(
            capacity = config.queue_capacity,
            shutdown = ?config.shutdown,
            "Capture pipeline started"
        );

        Ok(Self {
            queue,
            capturer,
            store,
            cancel,
            state,
            handle: Some(handle),
        })
    }

    /// Attach the capture hook to an already open connection
    pub fn register(&self, conn: &Connection) {
        embedded::register(conn, Arc::clone(&self.capturer));
    }

    /// Open the embedded database with the capture hook attached
    pub fn open_embedded(&self, config: &EmbeddedConfig) -> Result<Connection> {
        embedded::open_embedded(config, Arc::clone(&self.capturer))
    }

    /// Write observer feeding this pipeline
    pub fn capturer(&self) -> Arc<HookCapturer> {
        Arc::clone(&self.capturer)
    }

    /// Dispatcher for application events sharing this pipeline's store
    pub fn event_dispatcher(&self) -> EventDispatcher {
        EventDispatcher::new(Arc::clone(&self.store))
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    pub fn capture_stats(&self) -> CaptureStats {
        self.capturer.stats()
    }

    /// Watch the persister's state
    pub fn persister_state(&self) -> watch::Receiver<PersisterState> {
        self.state.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the persister and wait for its task to exit
    ///
    /// Does not wait for the queue to empty; what happens to buffered
    /// records is decided by the configured shutdown policy.
    pub async fn stop(mut self) -> Result<PersisterReport> {
        info!("Stopping capture pipeline");
        self.cancel.cancel();

        let handle = self
            .handle
            .take()
            .ok_or_else(|| MirrorError::Shutdown("persister already joined".to_string()))?;

        let report = handle
            .await
            .map_err(|e| MirrorError::Shutdown(format!("persister task failed: {}", e)))?;

        let capture = self.capturer.stats();
        info!(
            persisted = report.persisted,
            failed = report.persist_failures + report.serialize_failures,
            discarded = report.discarded,
            captured = capture.captured,
            dropped = capture.dropped,
            "Capture pipeline stopped"
        );

        Ok(report)
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        // never leave a detached persister behind
        self.cancel.cancel();
    }
}
