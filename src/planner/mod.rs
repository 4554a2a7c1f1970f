//! Join planner subsystem for synthdb
//!
//! Produces immutable, deterministic plans for synthetic record types:
//!
//! - `scan_for_type` enumerates every matching combination of constituent
//!   records currently in the store.
//! - `from_stored_type` enumerates, for one stored record, every synthetic
//!   record it participates in; the maintenance bridge is built on it.
//!
//! # Design principles
//!
//! - Deterministic: same schema -> same plan, same hash.
//! - Synchronous rejection: every invalid-type and unplannable-pattern
//!   error is raised at plan construction, before any store access.
//! - Index-driven: non-root constituents are bound through primary-key
//!   gets or value-index prefix scans; there is no scan-and-filter
//!   fallback.
//!
//! # Lookup strategy priority (strict order)
//!
//! 1. Exact primary-key match
//! 2. Value index whose columns equal the lookup key
//! 3. Value index with the lookup key as a strict prefix
//!
//! Ties broken by index declaration order.

mod errors;
mod plan;
mod planner;

pub use errors::{PlannerError, PlannerErrorCode, PlannerResult};
pub use plan::{
    FilterEdge, FromRecordBranch, JoinKey, JoinMode, LookupStrategy, PlanNode, SyntheticFromRecordPlan,
    SyntheticScanPlan,
};
pub use planner::SyntheticRecordPlanner;
