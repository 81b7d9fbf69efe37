// src/capture/queue.rs
//! Bounded change queue between write hooks and the persister
//!
//! Producers call [`ChangeQueue::try_enqueue`] from inside the embedded
//! engine's write path, so it is lock-free and never waits. When the queue is
//! full the newest record is rejected and the buffered ones stay untouched.
//!
//! The single consumer waits in [`ChangeQueue::dequeue`] until a record is
//! available or the cancellation token fires. Wakeups go through a
//! `Notify`; its stored permit covers a push that lands between an empty
//! `pop` and the consumer parking.

use crate::capture::record::ChangeRecord;
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Bounded MPSC queue of change records
pub struct ChangeQueue {
    /// Underlying bounded queue
    queue: ArrayQueue<ChangeRecord>,

    /// Consumer wakeup
    available: Notify,

    /// Accepted records
    enqueue_count: AtomicU64,

    /// Records handed to the consumer
    dequeue_count: AtomicU64,

    /// Records rejected because the queue was full
    drop_count: AtomicU64,
}

impl ChangeQueue {
    /// Create a queue with a fixed capacity
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            available: Notify::new(),
            enqueue_count: AtomicU64::new(0),
            dequeue_count: AtomicU64::new(0),
            drop_count: AtomicU64::new(0),
        }
    }

    /// Enqueue without blocking; `false` means the record was dropped
    pub fn try_enqueue(&self, record: ChangeRecord) -> bool {
        match self.queue.push(record) {
            Ok(()) => {
                self.enqueue_count.fetch_add(1, Ordering::Relaxed);
                self.available.notify_one();
                true
            }
            Err(_rejected) => {
                self.drop_count.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Wait for the next record
    ///
    /// Returns `None` once `cancel` has fired. Cancellation is checked before
    /// each attempt to take a record, so a cancelled consumer leaves the
    /// buffer alone.
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Option<ChangeRecord> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }

            if let Some(record) = self.try_dequeue() {
                return Some(record);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                _ = self.available.notified() => {}
            }
        }
    }

    /// Take the next record if one is buffered
    pub fn try_dequeue(&self) -> Option<ChangeRecord> {
        let record = self.queue.pop()?;
        self.dequeue_count.fetch_add(1, Ordering::Relaxed);
        Some(record)
    }

    /// Get queue statistics
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.enqueue_count.load(Ordering::Relaxed),
            dequeued: self.dequeue_count.load(Ordering::Relaxed),
            dropped: self.drop_count.load(Ordering::Relaxed),
            current_size: self.queue.len(),
            capacity: self.queue.capacity(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}

/// Queue statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    /// Total records accepted
    pub enqueued: u64,

    /// Total records handed to the consumer
    pub dequeued: u64,

    /// Total records rejected (queue full)
    pub dropped: u64,

    /// Current queue size
    pub current_size: usize,

    /// Queue capacity
    pub capacity: usize,
}

impl QueueStats {
    /// Calculate fill percentage
    pub fn fill_percentage(&self) -> f64 {
        (self.current_size as f64 / self.capacity as f64) * 100.0
    }

    /// Percentage of enqueue attempts that were dropped
    pub fn drop_rate(&self) -> f64 {
        let attempts = self.enqueued + self.dropped;
        if attempts == 0 {
            0.0
        } else {
            (self.dropped as f64 / attempts as f64) * 100.0
        }
    }
}
