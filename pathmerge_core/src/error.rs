//! Error types for the path-merging engine.

use thiserror::Error;

/// Errors that can occur while fitting or merging paths.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MergeError {
    /// Path too short for the requested spline degree, or zero arc length
    #[error("Degenerate input: {0}")]
    DegenerateInput(String),

    /// Index lookup outside the path bounds
    #[error("Index {index} out of range for path of length {len}")]
    InvalidIndex { index: usize, len: usize },

    /// A numeric parameter is outside its admissible range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The linear solve failed (SVD did not converge)
    #[error("Solver error: {0}")]
    Solver(String),

    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    Config(String),
}

impl MergeError {
    /// Creates a degenerate-input error.
    pub fn degenerate(msg: impl Into<String>) -> Self {
        Self::DegenerateInput(msg.into())
    }

    /// Creates an invalid-parameter error.
    pub fn parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Creates a configuration error.
    pub fn config(msg: impl std::fmt::Display) -> Self {
        Self::Config(msg.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MergeError>;
