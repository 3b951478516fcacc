//! Error types for the simulation harness.

use pathmerge_core::MergeError;
use thiserror::Error;

/// Errors that can stop a simulation run or sweep.
#[derive(Debug, Error)]
pub enum SimError {
    /// Reading or writing a file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Export or summary could not be serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The merger rejected its configuration
    #[error("Merger error: {0}")]
    Merge(#[from] MergeError),

    /// A sweep worker panicked or was cancelled
    #[error("Sweep worker failed: {0}")]
    Worker(String),
}

impl SimError {
    /// Creates a worker error.
    pub fn worker(msg: impl std::fmt::Display) -> Self {
        Self::Worker(msg.to_string())
    }
}
