//! Clique edge filter cursor
//!
//! Extra edges beyond the spanning tree are equality predicates over
//! already-bound values. Failing combinations are dropped, never emitted.
//! An edge touching an absent outer side passes vacuously, otherwise a
//! null-completion could never survive its own clique edges.

use futures_util::future::BoxFuture;

use super::continuation::ContinuationState;
use super::cursor::{CursorStep, MatchCursor};
use super::errors::ExecutorResult;
use crate::planner::FilterEdge;
use crate::synthetic::JoinedMatch;

pub(crate) struct CliqueFilterCursor {
    child: Box<dyn MatchCursor>,
    edges: Vec<FilterEdge>,
}

impl CliqueFilterCursor {
    pub fn new(child: Box<dyn MatchCursor>, edges: Vec<FilterEdge>) -> Self {
        Self { child, edges }
    }

    /// Equality on fan-out keys means some shared instance.
    fn passes(&self, m: &JoinedMatch) -> bool {
        self.edges.iter().all(|edge| {
            match (&m.slots[edge.left], &m.slots[edge.right]) {
                (Some(left), Some(right)) => {
                    let left_values = edge.left_key.evaluate(&left.value);
                    let right_values = edge.right_key.evaluate(&right.value);
                    left_values.iter().any(|v| right_values.contains(v))
                }
                _ => true,
            }
        })
    }
}

impl MatchCursor for CliqueFilterCursor {
    fn next(&mut self) -> BoxFuture<'_, ExecutorResult<CursorStep<JoinedMatch>>> {
        Box::pin(async move {
            loop {
                match self.child.next().await? {
                    CursorStep::Next(m) => {
                        if self.passes(&m) {
                            return Ok(CursorStep::Next(m));
                        }
                    }
                    CursorStep::Stop(reason) => return Ok(CursorStep::Stop(reason)),
                }
            }
        })
    }

    fn continuation(&self) -> ContinuationState {
        ContinuationState::CliqueFilter {
            child: Box::new(self.child.continuation()),
        }
    }
}
