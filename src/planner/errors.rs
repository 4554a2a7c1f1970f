//! Planner error types
//!
//! Error codes:
//! - SYNTH_PLAN_UNKNOWN_TYPE (REJECT)
//! - SYNTH_PLAN_UNKNOWN_RECORD_TYPE (REJECT)
//! - SYNTH_PLAN_NO_USABLE_INDEX (REJECT)
//! - SYNTH_PLAN_UNSUPPORTED_PATTERN (REJECT)
//! - SYNTH_PLAN_REPEATED_KEY (REJECT)
//!
//! All planning failures are reported synchronously at plan construction,
//! before any store access - never deferred to execution.

use std::fmt;

/// Planner-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerErrorCode {
    /// Synthetic type not found in the schema
    UnknownType,
    /// Stored record type not found in the schema
    UnknownRecordType,
    /// A non-root constituent has no primary-key or index strategy
    NoUsableIndex,
    /// Join shape the planner does not support
    UnsupportedPattern,
    /// Fan-out join keys rejected by `allow_repeated = false`
    RepeatedKey,
}

impl PlannerErrorCode {
    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            PlannerErrorCode::UnknownType => "SYNTH_PLAN_UNKNOWN_TYPE",
            PlannerErrorCode::UnknownRecordType => "SYNTH_PLAN_UNKNOWN_RECORD_TYPE",
            PlannerErrorCode::NoUsableIndex => "SYNTH_PLAN_NO_USABLE_INDEX",
            PlannerErrorCode::UnsupportedPattern => "SYNTH_PLAN_UNSUPPORTED_PATTERN",
            PlannerErrorCode::RepeatedKey => "SYNTH_PLAN_REPEATED_KEY",
        }
    }
}

impl fmt::Display for PlannerErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Planner error with full context
#[derive(Debug, Clone)]
pub struct PlannerError {
    code: PlannerErrorCode,
    message: String,
}

impl PlannerError {
    pub fn unknown_type(name: &str) -> Self {
        Self {
            code: PlannerErrorCode::UnknownType,
            message: format!("Synthetic type '{}' not found", name),
        }
    }

    pub fn unknown_record_type(name: &str) -> Self {
        Self {
            code: PlannerErrorCode::UnknownRecordType,
            message: format!("Record type '{}' not found", name),
        }
    }

    pub fn no_usable_index(joined: &str, constituent: &str) -> Self {
        Self {
            code: PlannerErrorCode::NoUsableIndex,
            message: format!(
                "No primary-key or index strategy binds constituent '{}' of '{}'",
                constituent, joined
            ),
        }
    }

    pub fn unsupported_pattern(joined: &str, reason: &str) -> Self {
        Self {
            code: PlannerErrorCode::UnsupportedPattern,
            message: format!("Cannot plan '{}': {}", joined, reason),
        }
    }

    pub fn repeated_key(joined: &str) -> Self {
        Self {
            code: PlannerErrorCode::RepeatedKey,
            message: format!(
                "Joined type '{}' has fan-out join keys; pass allow_repeated to accept duplicate emission",
                joined
            ),
        }
    }

    /// Returns the error code
    pub fn code(&self) -> PlannerErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PlannerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for PlannerError {}

/// Result type for planner operations
pub type PlannerResult<T> = Result<T, PlannerError>;
