//! Event names emitted by the join layer

/// A synthetic index was built from a full scan plan
pub const EVENT_INDEX_BUILT: &str = "synthetic_index_built";

/// Aggregate index deltas were applied inside a write transaction
pub const EVENT_INDEX_DELTA: &str = "synthetic_index_delta";
