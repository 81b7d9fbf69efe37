// src/pipeline/mod.rs
//! Pipeline wiring
//!
//! - **Lifecycle**: owns queue, capturer and persister task; start/stop
//! - **Events**: closed set of application events that get stored

pub mod events;
pub mod lifecycle;

// Re-export commonly used types
pub use events::{AppEvent, DispatchOutcome, EventDispatcher, LogEntry, LogLevel, MessageEvent};
pub use lifecycle::LifecycleController;
