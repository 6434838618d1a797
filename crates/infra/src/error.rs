//! Storage and service error types.
//!
//! `StoreError` covers infrastructure failures of the record stores.
//! `LedgerError` is what services hand back to callers: it wraps domain and
//! store failures and classifies them with [`ErrorKind`].

use thiserror::Error;

use medstock_core::DomainError;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The per-article balance changed between read and commit.
    #[error("concurrent modification: {0}")]
    Concurrency(String),

    /// A record addressed by key does not exist.
    #[error("record not found: {0}")]
    NotFound(String),

    /// The backing store failed (connection, query, decoding, ...).
    #[error("storage failure: {0}")]
    Backend(String),
}

/// Caller-visible classification of a failed operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Storage,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Per-article contention outlasted the retry budget.
    #[error("gave up after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Domain(DomainError::Validation(_)) => ErrorKind::Validation,
            LedgerError::Domain(DomainError::NotFound(_)) => ErrorKind::NotFound,
            LedgerError::Domain(DomainError::Conflict(_)) => ErrorKind::Conflict,
            LedgerError::Domain(DomainError::InvariantViolation(_)) => ErrorKind::Storage,
            LedgerError::Store(StoreError::NotFound(_)) => ErrorKind::NotFound,
            LedgerError::Store(StoreError::Concurrency(_)) => ErrorKind::Conflict,
            LedgerError::Store(StoreError::Backend(_)) => ErrorKind::Storage,
            LedgerError::RetriesExhausted { .. } => ErrorKind::Conflict,
        }
    }

    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        LedgerError::Domain(DomainError::not_found(what))
    }

    pub(crate) fn is_concurrency(&self) -> bool {
        matches!(self, LedgerError::Store(StoreError::Concurrency(_)))
    }
}

/// Map SQLx errors to `StoreError`.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // unique violation: a concurrent writer created the row first
                Some("23505") => StoreError::Concurrency(msg),
                // serialization failure / deadlock
                Some("40001") | Some("40P01") => StoreError::Concurrency(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::RowNotFound => {
            StoreError::NotFound(format!("unexpected row not found in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
