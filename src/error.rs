//! Error types for the limiter and its HTTP front end.

use thiserror::Error;

/// Main error type for limiter construction and service operations.
///
/// Rate decisions themselves never fail; a denied request is a decision,
/// not an error. These variants cover configuration and I/O only.
#[derive(Error, Debug)]
pub enum LimiterError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Refill rate was zero, negative or not finite
    #[error("Invalid rate {0}: must be a positive, finite number of tokens per second")]
    InvalidRate(f64),

    /// Burst capacity was zero, negative or not finite
    #[error("Invalid capacity {0}: must be a positive, finite number of tokens")]
    InvalidCapacity(f64),

    /// A duration setting was zero
    #[error("Invalid interval: {0} must be greater than zero")]
    InvalidInterval(&'static str),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for LimiterError {
    fn from(err: config::ConfigError) -> Self {
        LimiterError::Config(err.to_string())
    }
}

/// Result type alias for limiter operations.
pub type Result<T> = std::result::Result<T, LimiterError>;
