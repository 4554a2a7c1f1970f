//! Executor error types
//!
//! Error codes:
//! - SYNTH_EXEC_STORE (store-layer failure, propagated unchanged)
//! - SYNTH_EXEC_CONTINUATION_MALFORMED (non-retryable)
//! - SYNTH_EXEC_CONTINUATION_MISMATCH (non-retryable)
//! - SYNTH_EXEC_SEED_MISMATCH
//! - SYNTH_EXEC_DISJOINT_VIOLATION (fatal internal consistency)
//! - SYNTH_EXEC_INTERNAL (fatal internal consistency)
//!
//! The executor performs no retries: retrying a store failure requires a
//! fresh transaction it does not own, and resuming a mismatched
//! continuation would corrupt results.

use std::fmt;

use crate::store::StoreError;
use crate::tuple::TupleValue;

/// Executor-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorErrorCode {
    /// Underlying store failure (conflict, timeout, stale transaction, ..)
    Store,
    /// Continuation bytes failed to parse
    ContinuationMalformed,
    /// Continuation belongs to a different plan shape or operator
    ContinuationMismatch,
    /// From-record execution given a record of the wrong stored type
    SeedMismatch,
    /// Full-outer sides emitted overlapping primary keys (planner defect)
    DisjointViolation,
    /// Internal consistency failure (planner defect, not a data problem)
    Internal,
}

impl ExecutorErrorCode {
    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            ExecutorErrorCode::Store => "SYNTH_EXEC_STORE",
            ExecutorErrorCode::ContinuationMalformed => "SYNTH_EXEC_CONTINUATION_MALFORMED",
            ExecutorErrorCode::ContinuationMismatch => "SYNTH_EXEC_CONTINUATION_MISMATCH",
            ExecutorErrorCode::SeedMismatch => "SYNTH_EXEC_SEED_MISMATCH",
            ExecutorErrorCode::DisjointViolation => "SYNTH_EXEC_DISJOINT_VIOLATION",
            ExecutorErrorCode::Internal => "SYNTH_EXEC_INTERNAL",
        }
    }
}

impl fmt::Display for ExecutorErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Executor error with full context
#[derive(Debug, Clone)]
pub struct ExecutorError {
    code: ExecutorErrorCode,
    message: String,
    store: Option<StoreError>,
}

impl ExecutorError {
    pub fn store(err: StoreError) -> Self {
        Self {
            code: ExecutorErrorCode::Store,
            message: err.to_string(),
            store: Some(err),
        }
    }

    pub fn continuation_malformed(reason: impl Into<String>) -> Self {
        Self {
            code: ExecutorErrorCode::ContinuationMalformed,
            message: reason.into(),
            store: None,
        }
    }

    pub fn continuation_mismatch(reason: impl Into<String>) -> Self {
        Self {
            code: ExecutorErrorCode::ContinuationMismatch,
            message: reason.into(),
            store: None,
        }
    }

    pub fn seed_mismatch(expected: &str, got: &str) -> Self {
        Self {
            code: ExecutorErrorCode::SeedMismatch,
            message: format!("Plan pins record type '{}', got '{}'", expected, got),
            store: None,
        }
    }

    pub fn disjoint_violation(key: &TupleValue) -> Self {
        Self {
            code: ExecutorErrorCode::DisjointViolation,
            message: format!(
                "Full-outer sides both produced primary key {}",
                key
            ),
            store: None,
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self {
            code: ExecutorErrorCode::Internal,
            message: reason.into(),
            store: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> ExecutorErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The originating store failure, if any, unchanged
    pub fn store_error(&self) -> Option<&StoreError> {
        self.store.as_ref()
    }
}

impl fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for ExecutorError {}

impl From<StoreError> for ExecutorError {
    fn from(err: StoreError) -> Self {
        ExecutorError::store(err)
    }
}

/// Result type for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_preserved() {
        let err = ExecutorError::store(StoreError::Conflict("write-write".into()));
        assert_eq!(err.code(), ExecutorErrorCode::Store);
        assert!(matches!(err.store_error(), Some(StoreError::Conflict(_))));
    }

    #[test]
    fn test_error_codes_stable() {
        assert_eq!(
            ExecutorErrorCode::ContinuationMismatch.code(),
            "SYNTH_EXEC_CONTINUATION_MISMATCH"
        );
        assert_eq!(
            ExecutorErrorCode::DisjointViolation.code(),
            "SYNTH_EXEC_DISJOINT_VIOLATION"
        );
    }
}
