//! Continuation codec
//!
//! A continuation is opaque to callers: a serialized operator-state tree
//! wrapped in an envelope carrying the structural plan hash. Every
//! operator state is self-tagged by kind, so state fed to an incompatible
//! plan shape fails fast instead of silently resuming at a wrong position.

use serde::{Deserialize, Serialize};

use super::errors::{ExecutorError, ExecutorResult};
use crate::tuple::TupleValue;

/// Exact resumption state of one operator, plus its children's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContinuationState {
    /// Beginning of any operator
    Start,
    /// Extent scan: resume strictly after the last emitted primary key
    Scan {
        last_key: Option<TupleValue>,
        done: bool,
    },
    /// Pinned seed record: emitted or not
    Seed { done: bool },
    /// Nested-loop join: outer position from which the next outer row is
    /// (re)pulled, the fan-out instance to resume at, matches already
    /// emitted within it, and whether earlier instances of the row matched
    NestedLoop {
        outer: Box<ContinuationState>,
        key_index: usize,
        inner_pos: usize,
        any_match: bool,
    },
    /// Clique filter is stateless beyond its child
    CliqueFilter { child: Box<ContinuationState> },
    /// Full-outer union: active side and its state
    Union {
        side: u8,
        state: Box<ContinuationState>,
    },
    /// From-record plan: active branch, its state, and the primary keys
    /// already emitted for the current distinct group
    FromRecord {
        branch: usize,
        state: Box<ContinuationState>,
        seen: Vec<TupleValue>,
    },
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    plan: u32,
    state: ContinuationState,
}

/// Serializes a state tree under a plan fingerprint.
pub(crate) fn encode(plan_hash: u32, state: &ContinuationState) -> Vec<u8> {
    serde_json::to_vec(&Envelope {
        plan: plan_hash,
        state: state.clone(),
    })
    .expect("continuation state is always serializable")
}

/// Parses continuation bytes for one plan.
///
/// Malformed bytes and wrong-plan continuations are distinct,
/// non-retryable errors.
pub(crate) fn decode(plan_hash: u32, bytes: &[u8]) -> ExecutorResult<ContinuationState> {
    let envelope: Envelope = serde_json::from_slice(bytes)
        .map_err(|e| ExecutorError::continuation_malformed(format!("unparseable bytes: {}", e)))?;
    if envelope.plan != plan_hash {
        return Err(ExecutorError::continuation_mismatch(format!(
            "continuation was produced by plan {:08x}, not {:08x}",
            envelope.plan, plan_hash
        )));
    }
    Ok(envelope.state)
}
