//! Store error types

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Store-layer errors.
///
/// These surface unchanged through plan execution and index maintenance;
/// the join layer performs no retries, since retrying requires a fresh
/// transaction it does not own.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Unknown record type: {0}")]
    UnknownRecordType(String),

    #[error("Unknown index: {0}")]
    UnknownIndex(String),

    #[error("Transaction conflict: {0}")]
    Conflict(String),

    #[error("Transaction timeout: {0}")]
    Timeout(String),

    #[error("Stale transaction: {0}")]
    Stale(String),

    #[error("Storage backend failure: {0}")]
    Backend(String),
}
