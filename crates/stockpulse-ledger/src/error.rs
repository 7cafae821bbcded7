//! # Ledger Error Types
//!
//! What callers of the settlement engine see.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Ledger Error Categories                           │
//! │                                                                         │
//! │  ┌──────────────────────┐  ┌──────────────────────┐  ┌──────────────┐  │
//! │  │  Rejected (terminal) │  │  CommitFailure       │  │  Database    │  │
//! │  │                      │  │  (safe to retry)     │  │  (other)     │  │
//! │  │  ProductNotFound     │  │                      │  │              │  │
//! │  │  InsufficientStock   │  │  busy / pool timeout │  │  constraint  │  │
//! │  │  NegativeStock       │  │  after N attempts    │  │  I/O         │  │
//! │  │  Validation(..)      │  │                      │  │              │  │
//! │  └──────────────────────┘  └──────────────────────┘  └──────────────┘  │
//! │                                                                         │
//! │  Every variant means nothing was applied.                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use stockpulse_core::{CoreError, ValidationError};
use stockpulse_db::DbError;

use crate::config::ConfigError;

/// Result type alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger error type.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The request broke a business rule; resubmitting it unchanged fails
    /// the same way.
    #[error(transparent)]
    Rejected(#[from] CoreError),

    /// The store stayed busy through every commit attempt. Nothing was
    /// written; the caller may resubmit.
    #[error("Commit failed after {attempts} attempts: {source}")]
    CommitFailure {
        attempts: u32,
        #[source]
        source: DbError,
    },

    /// Any other database failure.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<ValidationError> for LedgerError {
    fn from(err: ValidationError) -> Self {
        LedgerError::Rejected(CoreError::Validation(err))
    }
}

impl LedgerError {
    /// The business rule behind a rejection, if this is one.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            LedgerError::Rejected(err) => Some(err),
            _ => None,
        }
    }

    /// Whether resubmitting the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::CommitFailure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_wraps_as_rejection() {
        let err: LedgerError = ValidationError::EmptyDocument.into();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::Validation(ValidationError::EmptyDocument))
        ));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_commit_failure_is_retryable() {
        let err = LedgerError::CommitFailure {
            attempts: 3,
            source: DbError::Busy("database is locked".to_string()),
        };
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Commit failed after 3 attempts: Database busy: database is locked"
        );
    }
}
