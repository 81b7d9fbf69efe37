// src/pipeline/events.rs
//! Application events forwarded to the change store
//!
//! The messaging client emits many event kinds. Incoming messages go to the
//! `messages` table; client log lines and explicitly recorded events are
//! stored as JSON in `logs`. Everything else maps to [`AppEvent::Other`] and
//! is ignored.

use crate::persist::store::ChangeStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

/// Incoming chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    /// Message id assigned by the messaging service
    pub reference: String,

    /// Conversation text
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// One client log line, stored as `{"level": ..., "message": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// Events recognized by the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    Message(MessageEvent),

    /// Log line from the messaging client
    Log(LogEntry),

    /// Any serialized event the application chose to record
    Record(serde_json::Value),

    /// Any event kind the pipeline does not store
    Other,
}

/// Result of dispatching one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Stored,
    Failed,
    Ignored,
}

/// Routes application events into the change store
#[derive(Clone)]
pub struct EventDispatcher {
    store: Arc<dyn ChangeStore>,
}

impl EventDispatcher {
    pub fn new(store: Arc<dyn ChangeStore>) -> Self {
        Self { store }
    }

    /// Store recognized events; failures are logged, never returned
    pub async fn dispatch(&self, event: &AppEvent) -> DispatchOutcome {
        match event {
            AppEvent::Message(message) => {
                match self.store.append_message(message, Utc::now()).await {
                    Ok(()) => {
                        debug!(reference = %message.reference, "Stored message");
                        DispatchOutcome::Stored
                    }
                    Err(e) => {
                        error!(error = %e, reference = %message.reference, "Failed to store message");
                        DispatchOutcome::Failed
                    }
                }
            }
            AppEvent::Log(entry) => self.store_log("log", entry).await,
            AppEvent::Record(value) => self.store_log("record", value).await,
            AppEvent::Other => DispatchOutcome::Ignored,
        }
    }

    /// Shorthand for dispatching a client log line
    pub async fn log(&self, level: LogLevel, message: impl Into<String>) -> DispatchOutcome {
        self.dispatch(&AppEvent::Log(LogEntry::new(level, message)))
            .await
    }

    async fn store_log<T: Serialize>(&self, kind: &'static str, value: &T) -> DispatchOutcome {
        let entry = match serde_json::to_string(value) {
            Ok(entry) => entry,
            Err(e) => {
                error!(error = %e, kind, "Failed to serialize log entry");
                return DispatchOutcome::Failed;
            }
        };

        match self.store.append_log(&entry, Utc::now()).await {
            Ok(()) => {
                debug!(kind, "Stored log entry");
                DispatchOutcome::Stored
            }
            Err(e) => {
                error!(error = %e, kind, "Failed to store log entry");
                DispatchOutcome::Failed
            }
        }
    }
}
