//! Error types for distill-rs.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// The item (or its metadata) does not exist upstream. Terminal per item.
    #[error("not found: {0}")]
    NotFound(String),

    /// The rate governor denied the call. Deferred, not a failure.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Generation dependency overloaded past the retry budget, or the
    /// circuit breaker is open.
    #[error("generation service overloaded: {0}")]
    ServiceOverloaded(String),

    /// Non-retryable generation failure.
    #[error("generation service error: {0}")]
    Service(String),

    /// Remote tracking store call failed.
    #[error("tracking store error: {0}")]
    RemoteStore(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("ledger error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
