// src/utils/errors.rs
//! Error taxonomy for the capture pipeline
//!
//! Only `Connection` (and configuration problems) are fatal, and only at
//! startup. Everything raised on the capture or persist path is logged,
//! counted and swallowed by the component that hit it.

use thiserror::Error;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum MirrorError {
    /// Bounded queue had no free slot; the record was dropped
    #[error("change queue full")]
    QueueFull,

    /// Record could not be rendered to its canonical form
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// External store rejected or failed the write
    #[error("persist failed: {0}")]
    Persist(String),

    /// External store unreachable at startup
    #[error("store connection failed: {0}")]
    Connection(String),

    /// Invalid or unreadable configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Embedded database could not be opened or prepared
    #[error("embedded database error: {0}")]
    Embedded(String),

    /// Persister task did not exit cleanly
    #[error("shutdown failed: {0}")]
    Shutdown(String),
}

impl MirrorError {
    /// Whether this error must abort startup
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MirrorError::Connection(_) | MirrorError::Config(_) | MirrorError::Embedded(_)
        )
    }
}

impl From<serde_json::Error> for MirrorError {
    fn from(err: serde_json::Error) -> Self {
        MirrorError::Serialization(err.to_string())
    }
}

impl From<rusqlite::Error> for MirrorError {
    fn from(err: rusqlite::Error) -> Self {
        MirrorError::Embedded(err.to_string())
    }
}

impl From<config::ConfigError> for MirrorError {
    fn from(err: config::ConfigError) -> Self {
        MirrorError::Config(err.to_string())
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, MirrorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(MirrorError::Connection("refused".into()).is_fatal());
        assert!(MirrorError::Config("capacity".into()).is_fatal());
        assert!(!MirrorError::QueueFull.is_fatal());
        assert!(!MirrorError::Persist("timeout".into()).is_fatal());
        assert!(!MirrorError::Serialization("bad".into()).is_fatal());
    }

    #[test]
    fn test_display() {
        let err = MirrorError::Persist("disk full".to_string());
        assert_eq!(err.to_string(), "persist failed: disk full");
    }
}
