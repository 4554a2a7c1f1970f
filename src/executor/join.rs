//! Nested-loop index join cursor
//!
//! For each outer partial match, evaluates the (possibly fan-out) lookup
//! key, issues one inner lookup per key instance, and emits the cross
//! product. Lookups are pipelined through a bounded `FuturesOrdered`
//! queue, the sole concurrency point of an execution: outer order is
//! preserved, and within one outer row inner matches arrive in inner-scan
//! order.
//!
//! Duplicate emission is intentional: two fan-out instances matching the
//! same inner row produce two synthetic records sharing a primary key.
//! This is observed, input-dependent behavior and is not deduplicated.
//!
//! Modes: `Inner` emits matches; `Outer` additionally emits exactly one
//! null-completion per outer row with no match across all of its key
//! instances; `Anti` emits only those completions.

use std::collections::VecDeque;

use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesOrdered, StreamExt};

use super::continuation::ContinuationState;
use super::cursor::{CursorStep, ExecContext, MatchCursor, StopReason};
use super::errors::{ExecutorError, ExecutorResult};
use super::scan::SCAN_PAGE;
use crate::planner::{JoinKey, JoinMode, LookupStrategy};
use crate::store::StoredRecord;
use crate::synthetic::JoinedMatch;
use crate::tuple::TupleValue;

type LookupFuture = BoxFuture<'static, ExecutorResult<Vec<StoredRecord>>>;

/// Bookkeeping for one queued lookup.
struct EntryMeta {
    outer_match: JoinedMatch,
    /// Outer position before this outer row; resuming here re-reads it
    outer_prev: ContinuationState,
    /// Outer position after this outer row
    outer_after: ContinuationState,
    key_index: usize,
    is_last: bool,
}

struct CurrentEntry {
    meta: EntryMeta,
    rows: Vec<StoredRecord>,
    pos: usize,
}

pub(crate) struct NestedLoopCursor {
    ctx: ExecContext,
    constituent: usize,
    record_type: String,
    keys: Vec<JoinKey>,
    strategy: LookupStrategy,
    mode: JoinMode,
    outer: Box<dyn MatchCursor>,
    outer_stop: Option<StopReason>,
    queue: FuturesOrdered<LookupFuture>,
    metas: VecDeque<EntryMeta>,
    current: Option<CurrentEntry>,
    // Resumption fields, consistent at every pull boundary.
    resume_outer: ContinuationState,
    resume_key_index: usize,
    resume_inner_pos: usize,
    any_match: bool,
    // Pending skip from a resumed continuation, applied to the first
    // dequeued entry.
    skip: Option<(usize, usize)>,
    first_row_min_key: usize,
}

impl NestedLoopCursor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: ExecContext,
        constituent: usize,
        record_type: String,
        keys: Vec<JoinKey>,
        strategy: LookupStrategy,
        mode: JoinMode,
        outer: Box<dyn MatchCursor>,
        key_index: usize,
        inner_pos: usize,
        any_match: bool,
        fresh: bool,
    ) -> Self {
        let resume_outer = outer.continuation();
        Self {
            ctx,
            constituent,
            record_type,
            keys,
            strategy,
            mode,
            outer,
            outer_stop: None,
            queue: FuturesOrdered::new(),
            metas: VecDeque::new(),
            current: None,
            resume_outer,
            resume_key_index: key_index,
            resume_inner_pos: inner_pos,
            any_match,
            skip: if fresh { None } else { Some((key_index, inner_pos)) },
            first_row_min_key: if fresh { 0 } else { key_index },
        }
    }

    /// Composite key instances for one outer match: the cross product of
    /// every conjunct's evaluations, in record order. An absent (outer
    /// null) source yields no instances.
    fn key_instances(&self, m: &JoinedMatch) -> Vec<Vec<TupleValue>> {
        let mut instances: Vec<Vec<TupleValue>> = vec![Vec::new()];
        for key in &self.keys {
            let source = match &m.slots[key.source] {
                Some(record) => record,
                None => return Vec::new(),
            };
            let parts = key.source_key.evaluate(&source.value);
            let mut next = Vec::with_capacity(instances.len() * parts.len());
            for prefix in &instances {
                for part in &parts {
                    let mut combined = prefix.clone();
                    combined.extend(part.iter().cloned());
                    next.push(combined);
                }
            }
            instances = next;
        }
        instances
    }

    /// Keeps up to `pipeline_depth` inner lookups in flight.
    async fn fill_queue(&mut self) -> ExecutorResult<()> {
        while self.outer_stop.is_none() && self.queue.len() < self.ctx.pipeline_depth {
            let outer_prev = self.outer.continuation();
            match self.outer.next().await? {
                CursorStep::Stop(reason) => {
                    self.outer_stop = Some(reason);
                }
                CursorStep::Next(outer_match) => {
                    let outer_after = self.outer.continuation();
                    let min_key = std::mem::take(&mut self.first_row_min_key);
                    let instances = self.key_instances(&outer_match);
                    let usable: Vec<(usize, Vec<TupleValue>)> = instances
                        .into_iter()
                        .enumerate()
                        .filter(|(i, _)| *i >= min_key)
                        .collect();
                    if usable.is_empty() {
                        // No lookups for this row; queue a marker so the
                        // completion check still runs in order.
                        self.metas.push_back(EntryMeta {
                            outer_match,
                            outer_prev,
                            outer_after,
                            key_index: min_key,
                            is_last: true,
                        });
                        self.queue.push_back(Box::pin(async { Ok(Vec::new()) }));
                        continue;
                    }
                    let last = usable.len() - 1;
                    for (pos, (key_index, values)) in usable.into_iter().enumerate() {
                        self.metas.push_back(EntryMeta {
                            outer_match: outer_match.clone(),
                            outer_prev: outer_prev.clone(),
                            outer_after: outer_after.clone(),
                            key_index,
                            is_last: pos == last,
                        });
                        self.queue.push_back(make_lookup(
                            self.ctx.clone(),
                            self.strategy.clone(),
                            self.record_type.clone(),
                            values,
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Drains the current entry; returns an item to emit, if any.
    fn drain_current(&mut self) -> Option<JoinedMatch> {
        loop {
            let current = self.current.as_mut()?;
            if current.pos < current.rows.len() {
                let record = current.rows[current.pos].clone();
                current.pos += 1;
                self.any_match = true;
                self.resume_inner_pos += 1;
                if self.mode != JoinMode::Anti {
                    return Some(current.meta.outer_match.with_slot(self.constituent, record));
                }
                continue;
            }
            // Entry exhausted.
            let entry = self.current.take().expect("current entry present");
            if entry.meta.is_last {
                let completed = !self.any_match
                    && matches!(self.mode, JoinMode::Outer | JoinMode::Anti);
                self.resume_outer = entry.meta.outer_after.clone();
                self.resume_key_index = 0;
                self.resume_inner_pos = 0;
                self.any_match = false;
                if completed {
                    return Some(entry.meta.outer_match);
                }
            } else {
                self.resume_key_index = entry.meta.key_index + 1;
                self.resume_inner_pos = 0;
            }
            return None;
        }
    }
}

impl MatchCursor for NestedLoopCursor {
    fn next(&mut self) -> BoxFuture<'_, ExecutorResult<CursorStep<JoinedMatch>>> {
        Box::pin(async move {
            loop {
                if self.current.is_some() {
                    if let Some(item) = self.drain_current() {
                        return Ok(CursorStep::Next(item));
                    }
                    continue;
                }
                self.fill_queue().await?;
                match self.queue.next().await {
                    None => {
                        let reason = self.outer_stop.unwrap_or(StopReason::Exhausted);
                        return Ok(CursorStep::Stop(reason));
                    }
                    Some(result) => {
                        let meta = self
                            .metas
                            .pop_front()
                            .ok_or_else(|| ExecutorError::internal("join queue out of sync"))?;
                        let start_pos = match self.skip.take() {
                            Some((key, pos)) if key == meta.key_index => pos,
                            _ => 0,
                        };
                        let rows = result?;
                        if meta.key_index == 0 && start_pos == 0 {
                            // First instance of a new outer row.
                            self.any_match = false;
                        }
                        self.resume_outer = meta.outer_prev.clone();
                        self.resume_key_index = meta.key_index;
                        self.resume_inner_pos = start_pos;
                        self.current = Some(CurrentEntry {
                            meta,
                            rows,
                            pos: start_pos,
                        });
                    }
                }
            }
        })
    }

    fn continuation(&self) -> ContinuationState {
        ContinuationState::NestedLoop {
            outer: Box::new(self.resume_outer.clone()),
            key_index: self.resume_key_index,
            inner_pos: self.resume_inner_pos,
            any_match: self.any_match,
        }
    }
}

/// One inner lookup, pk get or index prefix scan, as an owned future so
/// the pipeline can hold several in flight.
///
/// Lookups always run to completion so a resumed execution never stalls
/// on one; they consume the scan budget, which the extent scans consult
/// at their page boundaries.
fn make_lookup(
    ctx: ExecContext,
    strategy: LookupStrategy,
    record_type: String,
    values: Vec<TupleValue>,
) -> LookupFuture {
    Box::pin(async move {
        match strategy {
            LookupStrategy::PrimaryKey => {
                let pk = TupleValue::Tuple(values);
                let record = ctx
                    .tx
                    .load_record(&record_type, &pk)
                    .await
                    .map_err(ExecutorError::store)?;
                ctx.budget.consume(1);
                Ok(record.into_iter().collect())
            }
            LookupStrategy::Index { index } => {
                let mut rows = Vec::new();
                let mut after: Option<TupleValue> = None;
                loop {
                    let page = ctx
                        .tx
                        .scan_index(&index, &values, after.as_ref(), SCAN_PAGE)
                        .await
                        .map_err(ExecutorError::store)?;
                    ctx.budget.consume(page.len());
                    let fetched = page.len();
                    for entry in page {
                        let pk = entry
                            .primary_key()
                            .ok_or_else(|| {
                                ExecutorError::internal("index entry without primary key")
                            })?
                            .clone();
                        after = Some(entry.key.clone());
                        let record = ctx
                            .tx
                            .load_record(&record_type, &pk)
                            .await
                            .map_err(ExecutorError::store)?;
                        ctx.budget.consume(1);
                        if let Some(record) = record {
                            rows.push(record);
                        }
                    }
                    if fetched < SCAN_PAGE {
                        break;
                    }
                }
                Ok(rows)
            }
        }
    })
}
