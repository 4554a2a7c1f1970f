//! Maintenance error types
//!
//! Failures propagate through the enclosing write transaction: the caller
//! aborts, and the original write and all index deltas vanish together.

use thiserror::Error;

use crate::executor::ExecutorError;
use crate::planner::PlannerError;
use crate::store::StoreError;

/// Result type for maintenance operations
pub type MaintenanceResult<T> = Result<T, MaintenanceError>;

/// Index maintenance errors
#[derive(Debug, Clone, Error)]
pub enum MaintenanceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("Unknown record type: {0}")]
    UnknownRecordType(String),

    #[error("Unknown synthetic index: {0}")]
    UnknownIndex(String),

    #[error("Aggregate value for index '{0}' is not an integer")]
    InvalidAggregateValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_passes_through() {
        let err = MaintenanceError::from(StoreError::Timeout("5s".into()));
        assert_eq!(format!("{}", err), "Transaction timeout: 5s");
    }
}
