//! Error types for prefsync-core

use thiserror::Error;

/// Result type alias using prefsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in prefsync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid store configuration
    #[error("Invalid store configuration: {0}")]
    InvalidConfiguration(String),

    /// Session store is unreachable or misbehaving
    #[error("Store error: {0}")]
    Store(String),

    /// HTTP transport error talking to a remote store
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote store answered with an error payload
    #[error("Store API error: {0}")]
    Api(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
