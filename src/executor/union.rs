//! Full-outer union cursor
//!
//! Concatenates the primary direction with the symmetric missing-side
//! plan. The two must be disjoint by primary key, because the symmetric
//! side is explicitly restricted to rows unreachable from the primary
//! direction; an overlap is a planner defect and is asserted as a fatal
//! error, never silently deduplicated.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use super::continuation::ContinuationState;
use super::cursor::{CursorStep, MatchCursor, StopReason};
use super::errors::{ExecutorError, ExecutorResult};
use crate::schema::SyntheticRecordType;
use crate::synthetic::JoinedMatch;
use crate::tuple::TupleValue;

pub(crate) struct FullOuterUnionCursor {
    ty: Arc<SyntheticRecordType>,
    primary: Option<Box<dyn MatchCursor>>,
    symmetric: Box<dyn MatchCursor>,
    /// The primary plan's root constituent; symmetric rows must leave it
    /// absent
    primary_root: usize,
    /// Primary keys emitted by the primary side within this execution
    seen: HashSet<TupleValue>,
}

impl FullOuterUnionCursor {
    pub fn new(
        ty: Arc<SyntheticRecordType>,
        primary: Option<Box<dyn MatchCursor>>,
        symmetric: Box<dyn MatchCursor>,
        primary_root: usize,
    ) -> Self {
        Self {
            ty,
            primary,
            symmetric,
            primary_root,
            seen: HashSet::new(),
        }
    }
}

impl MatchCursor for FullOuterUnionCursor {
    fn next(&mut self) -> BoxFuture<'_, ExecutorResult<CursorStep<JoinedMatch>>> {
        Box::pin(async move {
            if let Some(primary) = &mut self.primary {
                match primary.next().await? {
                    CursorStep::Next(m) => {
                        self.seen.insert(m.primary_key(&self.ty));
                        return Ok(CursorStep::Next(m));
                    }
                    CursorStep::Stop(StopReason::Exhausted) => {
                        self.primary = None;
                    }
                    CursorStep::Stop(reason) => return Ok(CursorStep::Stop(reason)),
                }
            }
            match self.symmetric.next().await? {
                CursorStep::Next(m) => {
                    let key = m.primary_key(&self.ty);
                    if m.slots[self.primary_root].is_some() || self.seen.contains(&key) {
                        return Err(ExecutorError::disjoint_violation(&key));
                    }
                    Ok(CursorStep::Next(m))
                }
                CursorStep::Stop(reason) => Ok(CursorStep::Stop(reason)),
            }
        })
    }

    fn continuation(&self) -> ContinuationState {
        match &self.primary {
            Some(primary) => ContinuationState::Union {
                side: 0,
                state: Box::new(primary.continuation()),
            },
            None => ContinuationState::Union {
                side: 1,
                state: Box::new(self.symmetric.continuation()),
            },
        }
    }
}
