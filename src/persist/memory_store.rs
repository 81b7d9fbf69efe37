// src/persist/memory_store.rs
//! In-process change store
//!
//! Selected with the `memory://` URL for dry runs. Also supports failure
//! injection and a write gate that holds every append until released, which
//! makes persister timing observable.

use crate::persist::store::{
    format_timestamp, ChangeStore, StoredChange, StoredLog, StoredMessage,
};
use crate::pipeline::events::MessageEvent;
use crate::utils::errors::{MirrorError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

type FailPredicate = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Releases appends held by a gated [`MemoryChangeStore`]
#[derive(Clone)]
pub struct StoreGate {
    permits: Arc<Semaphore>,
}

impl StoreGate {
    /// Let `n` more appends through
    pub fn release(&self, n: usize) {
        self.permits.add_permits(n);
    }

    /// Let pending and future appends through
    pub fn open(&self) {
        self.permits.add_permits(1 << 20);
    }
}

/// Change store that keeps rows in memory
#[derive(Default)]
pub struct MemoryChangeStore {
    changes: Mutex<Vec<StoredChange>>,
    messages: Mutex<Vec<StoredMessage>>,
    logs: Mutex<Vec<StoredLog>>,
    next_id: AtomicU64,
    attempts: AtomicU64,
    fail_when: Option<FailPredicate>,
    gate: Option<Arc<Semaphore>>,
}

impl MemoryChangeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any append whose payload matches `predicate`
    pub fn failing_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.fail_when = Some(Box::new(predicate));
        self
    }

    /// Hold every append until the returned gate releases it
    pub fn gated(mut self) -> (Self, StoreGate) {
        let permits = Arc::new(Semaphore::new(0));
        self.gate = Some(Arc::clone(&permits));
        (self, StoreGate { permits })
    }

    /// Payloads stored so far, in append order
    pub fn payloads(&self) -> Vec<String> {
        self.changes.lock().iter().map(|c| c.payload.clone()).collect()
    }

    /// Number of append calls, including failed ones
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    async fn pass_gate(&self) -> Result<()> {
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| MirrorError::Persist(format!("Store gate closed: {}", e)))?;
            permit.forget();
        }
        Ok(())
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1
    }
}

fn tail<T: Clone>(rows: &[T], limit: usize) -> Vec<T> {
    rows[rows.len().saturating_sub(limit)..].to_vec()
}

#[async_trait]
impl ChangeStore for MemoryChangeStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn append_change(&self, payload: &str, created_at: DateTime<Utc>) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await?;

        if self.fail_when.as_ref().is_some_and(|fail| fail(payload)) {
            return Err(MirrorError::Persist("injected failure".to_string()));
        }

        let id = self.next_id();
        self.changes.lock().push(StoredChange {
            id,
            payload: payload.to_string(),
            created_at: format_timestamp(created_at),
        });
        Ok(())
    }

    async fn append_message(&self, message: &MessageEvent, created_at: DateTime<Utc>) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await?;

        if self.fail_when.as_ref().is_some_and(|fail| fail(&message.body)) {
            return Err(MirrorError::Persist("injected failure".to_string()));
        }

        let id = self.next_id();
        self.messages.lock().push(StoredMessage {
            id,
            reference: message.reference.clone(),
            body: message.body.clone(),
            created_at: format_timestamp(created_at),
        });
        Ok(())
    }

    async fn append_log(&self, entry: &str, created_at: DateTime<Utc>) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await?;

        if self.fail_when.as_ref().is_some_and(|fail| fail(entry)) {
            return Err(MirrorError::Persist("injected failure".to_string()));
        }

        let id = self.next_id();
        self.logs.lock().push(StoredLog {
            id,
            entry: entry.to_string(),
            created_at: format_timestamp(created_at),
        });
        Ok(())
    }

    async fn recent_changes(&self, limit: usize) -> Result<Vec<StoredChange>> {
        Ok(tail(&self.changes.lock(), limit))
    }

    async fn recent_messages(&self, limit: usize) -> Result<Vec<StoredMessage>> {
        Ok(tail(&self.messages.lock(), limit))
    }

    async fn recent_logs(&self, limit: usize) -> Result<Vec<StoredLog>> {
        Ok(tail(&self.logs.lock(), limit))
    }
}
