//! Domain error taxonomy.
//!
//! Validation and not-found errors abort an operation before any side
//! effects; storage errors roll back whatever transaction is open and
//! propagate. Per-period cascade failures are deliberately NOT represented
//! here — they are logged at the call site and the cascade keeps going.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Bad input, rejected before any mutation.
    #[error("{0}")]
    Validation(String),

    /// Bill / transaction / user absent, no mutation attempted.
    #[error("{0}")]
    NotFound(String),

    /// A period key that does not match its granularity's format.
    #[error("malformed period key '{key}' for {granularity} granularity")]
    MalformedPeriodKey {
        key: String,
        granularity: &'static str,
    },

    /// Query or exec failure, propagated up.
    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

impl LedgerError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
