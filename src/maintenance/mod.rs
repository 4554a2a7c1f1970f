//! Index maintenance bridge for synthdb
//!
//! The save/delete path for constituent records: recomputes the synthetic
//! records each write version participates in (reverse plans, old and new)
//! and applies per-index deltas inside the caller's transaction. Aggregate
//! indexes are maintained as signed contribution deltas, never a group
//! rescan. If the transaction aborts, nothing applies.

mod bridge;
mod errors;

pub use bridge::IndexBridge;
pub use errors::{MaintenanceError, MaintenanceResult};
