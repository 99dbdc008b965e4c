//! Error types for the DDNS update server
//!
//! This module defines all error types used throughout the crate.
//!
//! Note that the update pipeline does not use these for its user-visible
//! decisions: `badauth`, `abuse` and friends are [`UpdateOutcome`] values.
//! Errors here describe collaborator failures (store, backend, hashing) and
//! administrative request problems.
//!
//! [`UpdateOutcome`]: crate::pipeline::UpdateOutcome

use thiserror::Error;

/// Result type alias for DDNS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the DDNS system
#[derive(Error, Debug)]
pub enum Error {
    /// Record (or zone) not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A record with the same key already exists
    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    /// A conditional write lost against a concurrent writer
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting or lockout
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Record store errors
    #[error("Record store error: {0}")]
    Store(String),

    /// Credential hashing errors
    #[error("Hashing error: {0}")]
    Hashing(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A DNS backend call did not finish before its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an "already exists" error
    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    /// Create a write conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a record store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a hashing error
    pub fn hashing(msg: impl Into<String>) -> Self {
        Self::Hashing(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// True when the error came from the DNS side (backend or provider)
    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Provider { .. } | Self::Timeout(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
