//! Error types for Synheart Sentinel

use thiserror::Error;

/// Errors raised at the fallible seams of the engine (storage, parsing, config).
///
/// The session-level operations never surface these; they are logged and the
/// affected feature degrades to its zero value.
#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Invalid interaction event: {0}")]
    InvalidEvent(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
