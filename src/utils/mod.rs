// src/utils/mod.rs
//! Shared configuration and error types

pub mod config;
pub mod errors;

pub use self::config::{MirrorConfig, ShutdownPolicy};
pub use self::errors::{MirrorError, Result};
