//! Error types for Floodgate operations.

use std::time::Duration;
use thiserror::Error;

/// Main error type for Floodgate operations.
#[derive(Error, Debug)]
pub enum FloodgateError {
    /// Configuration-related errors (invalid limits, unparseable config)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backend communication errors from the shared-state store
    #[error("Backend error: {0}")]
    Backend(#[from] redis::RedisError),

    /// A bounded backend call did not complete in time
    #[error("Backend call timed out after {0:?}")]
    Timeout(Duration),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Floodgate operations.
pub type Result<T> = std::result::Result<T, FloodgateError>;
