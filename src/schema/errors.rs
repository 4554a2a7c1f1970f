//! Schema error types
//!
//! Error codes:
//! - SYNTH_SCHEMA_DUPLICATE_TYPE
//! - SYNTH_SCHEMA_DUPLICATE_INDEX
//! - SYNTH_SCHEMA_UNKNOWN_RECORD_TYPE
//! - SYNTH_SCHEMA_INVALID_PRIMARY_KEY
//! - SYNTH_SCHEMA_UNKNOWN_CONSTITUENT
//! - SYNTH_SCHEMA_DUPLICATE_CONSTITUENT
//! - SYNTH_SCHEMA_TOO_FEW_CONSTITUENTS
//! - SYNTH_SCHEMA_KEY_ARITY_MISMATCH
//! - SYNTH_SCHEMA_DISCONNECTED
//! - SYNTH_SCHEMA_INVALID_INDEX
//!
//! All are rejected synchronously at schema build time, before any plan
//! or store access exists.

use std::fmt;

/// Schema-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorCode {
    /// Record or synthetic type name declared twice
    DuplicateType,
    /// Index name declared twice
    DuplicateIndex,
    /// Reference to a record type that does not exist
    UnknownRecordType,
    /// Primary key expression fans out or is empty
    InvalidPrimaryKey,
    /// Join edge references a constituent the type does not declare
    UnknownConstituent,
    /// Constituent name declared twice within one joined type
    DuplicateConstituent,
    /// Joined type with fewer than two constituents
    TooFewConstituents,
    /// Join edge sides evaluate to different key widths
    KeyArityMismatch,
    /// Join edges do not connect all constituents
    Disconnected,
    /// Synthetic index definition is inconsistent
    InvalidIndex,
}

impl SchemaErrorCode {
    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            SchemaErrorCode::DuplicateType => "SYNTH_SCHEMA_DUPLICATE_TYPE",
            SchemaErrorCode::DuplicateIndex => "SYNTH_SCHEMA_DUPLICATE_INDEX",
            SchemaErrorCode::UnknownRecordType => "SYNTH_SCHEMA_UNKNOWN_RECORD_TYPE",
            SchemaErrorCode::InvalidPrimaryKey => "SYNTH_SCHEMA_INVALID_PRIMARY_KEY",
            SchemaErrorCode::UnknownConstituent => "SYNTH_SCHEMA_UNKNOWN_CONSTITUENT",
            SchemaErrorCode::DuplicateConstituent => "SYNTH_SCHEMA_DUPLICATE_CONSTITUENT",
            SchemaErrorCode::TooFewConstituents => "SYNTH_SCHEMA_TOO_FEW_CONSTITUENTS",
            SchemaErrorCode::KeyArityMismatch => "SYNTH_SCHEMA_KEY_ARITY_MISMATCH",
            SchemaErrorCode::Disconnected => "SYNTH_SCHEMA_DISCONNECTED",
            SchemaErrorCode::InvalidIndex => "SYNTH_SCHEMA_INVALID_INDEX",
        }
    }
}

impl fmt::Display for SchemaErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Schema error with full context
#[derive(Debug, Clone)]
pub struct SchemaError {
    code: SchemaErrorCode,
    message: String,
}

impl SchemaError {
    pub fn new(code: SchemaErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn duplicate_type(name: &str) -> Self {
        Self::new(
            SchemaErrorCode::DuplicateType,
            format!("Type '{}' declared more than once", name),
        )
    }

    pub fn duplicate_index(name: &str) -> Self {
        Self::new(
            SchemaErrorCode::DuplicateIndex,
            format!("Index '{}' declared more than once", name),
        )
    }

    pub fn unknown_record_type(name: &str) -> Self {
        Self::new(
            SchemaErrorCode::UnknownRecordType,
            format!("Record type '{}' not found", name),
        )
    }

    pub fn invalid_primary_key(record_type: &str) -> Self {
        Self::new(
            SchemaErrorCode::InvalidPrimaryKey,
            format!("Primary key of '{}' must be scalar", record_type),
        )
    }

    pub fn unknown_constituent(joined: &str, constituent: &str) -> Self {
        Self::new(
            SchemaErrorCode::UnknownConstituent,
            format!("Joined type '{}' has no constituent '{}'", joined, constituent),
        )
    }

    pub fn duplicate_constituent(joined: &str, constituent: &str) -> Self {
        Self::new(
            SchemaErrorCode::DuplicateConstituent,
            format!("Constituent '{}' declared twice in '{}'", constituent, joined),
        )
    }

    pub fn too_few_constituents(joined: &str) -> Self {
        Self::new(
            SchemaErrorCode::TooFewConstituents,
            format!("Joined type '{}' needs at least two constituents", joined),
        )
    }

    pub fn key_arity_mismatch(joined: &str, left: usize, right: usize) -> Self {
        Self::new(
            SchemaErrorCode::KeyArityMismatch,
            format!(
                "Join edge in '{}' compares {} columns with {}",
                joined, left, right
            ),
        )
    }

    pub fn disconnected(joined: &str, constituent: &str) -> Self {
        Self::new(
            SchemaErrorCode::Disconnected,
            format!(
                "Constituent '{}' of '{}' is not reachable through join edges",
                constituent, joined
            ),
        )
    }

    pub fn invalid_index(name: &str, reason: &str) -> Self {
        Self::new(
            SchemaErrorCode::InvalidIndex,
            format!("Synthetic index '{}': {}", name, reason),
        )
    }

    /// Returns the error code
    pub fn code(&self) -> SchemaErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for SchemaError {}

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;
