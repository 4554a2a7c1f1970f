//! Schema subsystem for synthdb
//!
//! Holds the immutable metadata snapshot every plan is built against:
//! stored record types with their primary keys, value indexes on stored
//! types (the planner's lookup strategies come from these), joined
//! (synthetic) record types, and index definitions over synthetic types.
//!
//! # Invariants
//!
//! - A schema is validated completely at build time; an invalid synthetic
//!   type never reaches the planner.
//! - Joined-type ordinals are negative and assigned in declaration order;
//!   they lead every synthetic primary key and must stay stable.
//! - A built `Schema` is immutable and shared read-only (`Arc`).

mod builder;
mod errors;
mod types;

pub use builder::{JoinedTypeBuilder, SchemaBuilder};
pub use errors::{SchemaError, SchemaErrorCode, SchemaResult};
pub use types::{
    Constituent, ConstituentKey, IndexDefinition, IndexKind, JoinEdge, KeyExpression, RecordType,
    Schema, SyntheticIndexDefinition, SyntheticRecordType,
};
