//! Cursor core
//!
//! Execution is single-pass, forward-only, asynchronous pull: each
//! operator cursor exposes next / stop, suspends cooperatively during
//! store round trips, and reports its exact position between any two
//! pulls. The operator tree is rebuilt from (plan node, continuation
//! state) pairs by exhaustive match; a state that does not fit its node
//! kind is rejected before any store access.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use super::continuation::{self, ContinuationState};
use super::errors::{ExecutorError, ExecutorResult};
use super::filter::CliqueFilterCursor;
use super::join::NestedLoopCursor;
use super::limits::{ExecuteLimits, ScanBudget};
use super::scan::{ScanCursor, SeedCursor};
use super::union::FullOuterUnionCursor;
use crate::planner::{PlanNode, SyntheticFromRecordPlan, SyntheticScanPlan};
use crate::schema::SyntheticRecordType;
use crate::store::{StoreTransaction, StoredRecord};
use crate::synthetic::{JoinedMatch, SyntheticRecord};
use crate::tuple::TupleValue;

/// Why a cursor produced no further item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The source is genuinely finished; no continuation remains
    Exhausted,
    /// The caller's row limit was reached; resumable
    RowLimit,
    /// The caller's scan budget was consumed; resumable
    ScanLimit,
    /// The caller's time budget elapsed; resumable
    TimeLimit,
}

/// One step of an operator cursor.
pub(crate) enum CursorStep<T> {
    Next(T),
    Stop(StopReason),
}

/// Shared per-execution context.
#[derive(Clone)]
pub(crate) struct ExecContext {
    pub tx: Arc<dyn StoreTransaction>,
    pub budget: Arc<ScanBudget>,
    pub pipeline_depth: usize,
}

/// Internal pull cursor over partial matches.
///
/// `continuation` must be consistent at every boundary between `next`
/// calls; resuming from it reproduces the remaining sequence exactly.
pub(crate) trait MatchCursor: Send {
    fn next(&mut self) -> BoxFuture<'_, ExecutorResult<CursorStep<JoinedMatch>>>;
    fn continuation(&self) -> ContinuationState;
}

/// Innermost constituent of a plan branch (its scan or seed root).
fn leaf_constituent(node: &PlanNode) -> usize {
    match node {
        PlanNode::Scan { constituent, .. } => *constituent,
        PlanNode::Seed { constituent } => *constituent,
        PlanNode::NestedLoop { outer, .. } => leaf_constituent(outer),
        PlanNode::CliqueFilter { child, .. } => leaf_constituent(child),
        PlanNode::FullOuterUnion { primary, .. } => leaf_constituent(primary),
    }
}

/// Builds the cursor tree for one plan node from a continuation state.
pub(crate) fn build_cursor(
    node: &PlanNode,
    ty: &Arc<SyntheticRecordType>,
    ctx: &ExecContext,
    seed: Option<&StoredRecord>,
    state: ContinuationState,
) -> ExecutorResult<Box<dyn MatchCursor>> {
    let width = ty.constituents.len();
    match node {
        PlanNode::Scan {
            constituent,
            record_type,
        } => {
            let (last_key, done) = match state {
                ContinuationState::Start => (None, false),
                ContinuationState::Scan { last_key, done } => (last_key, done),
                other => return Err(state_mismatch("scan", &other)),
            };
            Ok(Box::new(ScanCursor::new(
                ctx.clone(),
                *constituent,
                record_type.clone(),
                width,
                last_key,
                done,
            )))
        }
        PlanNode::Seed { constituent } => {
            let done = match state {
                ContinuationState::Start => false,
                ContinuationState::Seed { done } => done,
                other => return Err(state_mismatch("seed", &other)),
            };
            let record = seed
                .ok_or_else(|| ExecutorError::internal("seed node outside a from-record plan"))?;
            Ok(Box::new(SeedCursor::new(
                *constituent,
                width,
                record.clone(),
                done,
            )))
        }
        PlanNode::NestedLoop {
            outer,
            constituent,
            record_type,
            keys,
            strategy,
            mode,
        } => {
            let (outer_state, key_index, inner_pos, any_match, fresh) = match state {
                ContinuationState::Start => (ContinuationState::Start, 0, 0, false, true),
                ContinuationState::NestedLoop {
                    outer,
                    key_index,
                    inner_pos,
                    any_match,
                } => (*outer, key_index, inner_pos, any_match, false),
                other => return Err(state_mismatch("nested-loop", &other)),
            };
            let outer_cursor = build_cursor(outer, ty, ctx, seed, outer_state)?;
            Ok(Box::new(NestedLoopCursor::new(
                ctx.clone(),
                *constituent,
                record_type.clone(),
                keys.clone(),
                strategy.clone(),
                *mode,
                outer_cursor,
                key_index,
                inner_pos,
                any_match,
                fresh,
            )))
        }
        PlanNode::CliqueFilter { child, edges } => {
            let child_state = match state {
                ContinuationState::Start => ContinuationState::Start,
                ContinuationState::CliqueFilter { child } => *child,
                other => return Err(state_mismatch("clique-filter", &other)),
            };
            let child_cursor = build_cursor(child, ty, ctx, seed, child_state)?;
            Ok(Box::new(CliqueFilterCursor::new(child_cursor, edges.clone())))
        }
        PlanNode::FullOuterUnion { primary, symmetric } => {
            let (side, side_state) = match state {
                ContinuationState::Start => (0, ContinuationState::Start),
                ContinuationState::Union { side, state } => (side, *state),
                other => return Err(state_mismatch("full-outer-union", &other)),
            };
            let primary_root = leaf_constituent(primary);
            let (primary_cursor, symmetric_cursor) = match side {
                0 => (
                    Some(build_cursor(primary, ty, ctx, seed, side_state)?),
                    build_cursor(symmetric, ty, ctx, seed, ContinuationState::Start)?,
                ),
                1 => (None, build_cursor(symmetric, ty, ctx, seed, side_state)?),
                other => {
                    return Err(ExecutorError::continuation_mismatch(format!(
                        "union continuation names side {}",
                        other
                    )))
                }
            };
            Ok(Box::new(FullOuterUnionCursor::new(
                Arc::clone(ty),
                primary_cursor,
                symmetric_cursor,
                primary_root,
            )))
        }
    }
}

fn state_mismatch(expected: &str, got: &ContinuationState) -> ExecutorError {
    ExecutorError::continuation_mismatch(format!(
        "operator '{}' cannot resume from state {:?}",
        expected, got
    ))
}

struct BranchRuntime {
    ty: Arc<SyntheticRecordType>,
    distinct: bool,
    cursor: Box<dyn MatchCursor>,
}

enum Driver {
    Scan {
        ty: Arc<SyntheticRecordType>,
        root: Box<dyn MatchCursor>,
    },
    FromRecord {
        branches: Vec<Option<BranchRuntime>>,
        active: usize,
        seen: HashSet<TupleValue>,
    },
}

/// Lazy sequence of synthetic records for one plan execution.
///
/// Pull with `next`; after it returns `None`, `stop_reason` says why.
/// `continuation` is valid between any two pulls and after a limit stop;
/// it is `None` once the execution is genuinely exhausted.
pub struct SyntheticCursor {
    driver: Driver,
    plan_hash: u32,
    row_limit: Option<usize>,
    emitted: usize,
    stop: Option<StopReason>,
}

impl std::fmt::Debug for SyntheticCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntheticCursor")
            .field("plan_hash", &self.plan_hash)
            .field("row_limit", &self.row_limit)
            .field("emitted", &self.emitted)
            .field("stop", &self.stop)
            .finish_non_exhaustive()
    }
}

impl SyntheticCursor {
    pub(crate) fn for_scan_plan(
        plan: &SyntheticScanPlan,
        tx: Arc<dyn StoreTransaction>,
        continuation: Option<&[u8]>,
        limits: ExecuteLimits,
    ) -> ExecutorResult<Self> {
        let state = match continuation {
            None => ContinuationState::Start,
            Some(bytes) => continuation::decode(plan.plan_hash, bytes)?,
        };
        let ctx = ExecContext {
            tx,
            budget: ScanBudget::new(limits.scan_limit, limits.time_limit),
            pipeline_depth: limits.pipeline_depth.max(1),
        };
        let root = build_cursor(&plan.root, &plan.synthetic_type, &ctx, None, state)?;
        Ok(Self {
            driver: Driver::Scan {
                ty: Arc::clone(&plan.synthetic_type),
                root,
            },
            plan_hash: plan.plan_hash,
            row_limit: limits.row_limit,
            emitted: 0,
            stop: None,
        })
    }

    pub(crate) fn for_from_record_plan(
        plan: &SyntheticFromRecordPlan,
        tx: Arc<dyn StoreTransaction>,
        record: &StoredRecord,
        continuation: Option<&[u8]>,
        limits: ExecuteLimits,
    ) -> ExecutorResult<Self> {
        if record.record_type != plan.record_type {
            return Err(ExecutorError::seed_mismatch(
                &plan.record_type,
                &record.record_type,
            ));
        }
        let (active, active_state, seen) = match continuation {
            None => (0, ContinuationState::Start, Vec::new()),
            Some(bytes) => match continuation::decode(plan.plan_hash, bytes)? {
                ContinuationState::Start => (0, ContinuationState::Start, Vec::new()),
                ContinuationState::FromRecord {
                    branch,
                    state,
                    seen,
                } => (branch, *state, seen),
                other => return Err(state_mismatch("from-record", &other)),
            },
        };
        if active > plan.branches.len() {
            return Err(ExecutorError::continuation_mismatch(format!(
                "continuation names branch {} of {}",
                active,
                plan.branches.len()
            )));
        }
        let ctx = ExecContext {
            tx,
            budget: ScanBudget::new(limits.scan_limit, limits.time_limit),
            pipeline_depth: limits.pipeline_depth.max(1),
        };
        let mut branches = Vec::with_capacity(plan.branches.len());
        for (i, branch) in plan.branches.iter().enumerate() {
            if i < active {
                branches.push(None);
                continue;
            }
            let state = if i == active {
                active_state.clone()
            } else {
                ContinuationState::Start
            };
            let cursor = build_cursor(&branch.root, &branch.synthetic_type, &ctx, Some(record), state)?;
            branches.push(Some(BranchRuntime {
                ty: Arc::clone(&branch.synthetic_type),
                distinct: branch.distinct,
                cursor,
            }));
        }
        Ok(Self {
            driver: Driver::FromRecord {
                branches,
                active,
                seen: seen.into_iter().collect(),
            },
            plan_hash: plan.plan_hash,
            row_limit: limits.row_limit,
            emitted: 0,
            stop: None,
        })
    }

    /// Pulls the next synthetic record.
    ///
    /// `Ok(None)` means stopped; `stop_reason` distinguishes exhaustion
    /// from a limit pause.
    pub async fn next(&mut self) -> ExecutorResult<Option<SyntheticRecord>> {
        if self.stop.is_some() {
            return Ok(None);
        }
        if let Some(limit) = self.row_limit {
            if self.emitted >= limit {
                self.stop = Some(StopReason::RowLimit);
                return Ok(None);
            }
        }
        let record = match &mut self.driver {
            Driver::Scan { ty, root } => match root.next().await? {
                CursorStep::Next(m) => Some(SyntheticRecord::assemble(Arc::clone(ty), m)),
                CursorStep::Stop(reason) => {
                    self.stop = Some(reason);
                    None
                }
            },
            Driver::FromRecord {
                branches,
                active,
                seen,
            } => {
                let mut produced = None;
                while *active < branches.len() {
                    let runtime = branches[*active]
                        .as_mut()
                        .ok_or_else(|| ExecutorError::internal("active branch missing"))?;
                    match runtime.cursor.next().await? {
                        CursorStep::Next(m) => {
                            let record = SyntheticRecord::assemble(Arc::clone(&runtime.ty), m);
                            if runtime.distinct
                                && !seen.insert(record.primary_key().clone())
                            {
                                continue;
                            }
                            produced = Some(record);
                            break;
                        }
                        CursorStep::Stop(StopReason::Exhausted) => {
                            let finished_type = runtime.ty.name.clone();
                            branches[*active] = None;
                            *active += 1;
                            let next_same_type = branches
                                .get(*active)
                                .and_then(|b| b.as_ref())
                                .map(|b| b.ty.name == finished_type)
                                .unwrap_or(false);
                            if !next_same_type {
                                seen.clear();
                            }
                        }
                        CursorStep::Stop(reason) => {
                            self.stop = Some(reason);
                            break;
                        }
                    }
                }
                if produced.is_none() && self.stop.is_none() {
                    self.stop = Some(StopReason::Exhausted);
                }
                produced
            }
        };
        if record.is_some() {
            self.emitted += 1;
        }
        Ok(record)
    }

    /// Drains the remaining records.
    pub async fn collect(&mut self) -> ExecutorResult<Vec<SyntheticRecord>> {
        let mut records = Vec::new();
        while let Some(record) = self.next().await? {
            records.push(record);
        }
        Ok(records)
    }

    /// Why the last `next` returned `None`; `None` while still streaming.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop
    }

    /// Opaque resumption token for the current position.
    ///
    /// `None` once the execution is exhausted. Callers must return the
    /// bytes verbatim to the same plan shape that produced them.
    pub fn continuation(&self) -> Option<Vec<u8>> {
        if self.stop == Some(StopReason::Exhausted) {
            return None;
        }
        let state = match &self.driver {
            Driver::Scan { root, .. } => root.continuation(),
            Driver::FromRecord {
                branches,
                active,
                seen,
            } => {
                let branch_state = branches
                    .get(*active)
                    .and_then(|b| b.as_ref())
                    .map(|b| b.cursor.continuation())
                    .unwrap_or(ContinuationState::Start);
                let mut seen: Vec<TupleValue> = seen.iter().cloned().collect();
                seen.sort();
                ContinuationState::FromRecord {
                    branch: *active,
                    state: Box::new(branch_state),
                    seen,
                }
            }
        };
        Some(continuation::encode(self.plan_hash, &state))
    }
}
