//! Domain error taxonomy
//!
//! The domain layer returns typed results; the HTTP edge maps each kind to
//! a status code (see `api::error`). Background jobs catch everything,
//! record the error text into their job-run row and resume on the next tick.

use thiserror::Error;

/// Errors surfaced by the domain layer.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Malformed request, range violation, unit mismatch. HTTP 400.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unique-constraint collision, disabled channel, active run overlap. HTTP 409.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Legacy endpoint removed; message carries the replacement directive. HTTP 410.
    #[error("{0}")]
    Gone(String),

    /// Missing profile, mapping, channel or run. HTTP 404.
    #[error("not found: {0}")]
    NotFound(String),

    /// No default channel, service not initialized. HTTP 503.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// EOS call failure, DB deadlock, broker disconnect. Retried at the
    /// worker level; surfaced only when retries are exhausted. HTTP 502.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Schema mismatch, corrupt persisted preference. The offending worker
    /// halts; other workers continue.
    #[error("fatal: {0}")]
    Fatal(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }
}

impl From<reqwest::Error> for DomainError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transient(err.to_string())
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
