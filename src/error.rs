//! Error types for the Turnstile service.

use thiserror::Error;

/// Errors raised by a counter store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend could not be reached or refused the operation
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A value could not be encoded for the backend
    #[error("Failed to encode value for key {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A value read from the backend could not be decoded
    #[error("Failed to decode value for key {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Main error type for Turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Counter store errors surfaced from an admission decision
    #[error("Counter store error: {0}")]
    Store(#[from] StoreError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
