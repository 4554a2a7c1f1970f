//! Extent scan and seed cursors

use std::collections::VecDeque;

use futures_util::future::BoxFuture;

use super::continuation::ContinuationState;
use super::cursor::{CursorStep, ExecContext, MatchCursor, StopReason};
use super::errors::{ExecutorError, ExecutorResult};
use crate::store::StoredRecord;
use crate::synthetic::JoinedMatch;
use crate::tuple::TupleValue;

/// Store rows fetched per round trip.
pub(crate) const SCAN_PAGE: usize = 64;

/// Ordered scan over one constituent's whole extent.
///
/// Wraps the store's paged range scan; the continuation is the last
/// emitted primary key, which is exactly the store's resumption
/// granularity.
pub(crate) struct ScanCursor {
    ctx: ExecContext,
    constituent: usize,
    record_type: String,
    width: usize,
    buffer: VecDeque<StoredRecord>,
    last_key: Option<TupleValue>,
    store_done: bool,
}

impl ScanCursor {
    pub fn new(
        ctx: ExecContext,
        constituent: usize,
        record_type: String,
        width: usize,
        last_key: Option<TupleValue>,
        done: bool,
    ) -> Self {
        Self {
            ctx,
            constituent,
            record_type,
            width,
            buffer: VecDeque::new(),
            last_key,
            store_done: done,
        }
    }
}

impl MatchCursor for ScanCursor {
    fn next(&mut self) -> BoxFuture<'_, ExecutorResult<CursorStep<JoinedMatch>>> {
        Box::pin(async move {
            loop {
                if let Some(record) = self.buffer.pop_front() {
                    self.last_key = Some(record.primary_key.clone());
                    return Ok(CursorStep::Next(JoinedMatch::seeded(
                        self.width,
                        self.constituent,
                        record,
                    )));
                }
                if self.store_done {
                    return Ok(CursorStep::Stop(StopReason::Exhausted));
                }
                if let Some(reason) = self.ctx.budget.pause() {
                    return Ok(CursorStep::Stop(reason));
                }
                let page = self
                    .ctx
                    .tx
                    .scan_records(&self.record_type, self.last_key.as_ref(), SCAN_PAGE)
                    .await
                    .map_err(ExecutorError::store)?;
                self.ctx.budget.consume(page.len());
                if page.len() < SCAN_PAGE {
                    self.store_done = true;
                }
                self.buffer.extend(page);
            }
        })
    }

    fn continuation(&self) -> ContinuationState {
        // Prefetched but unemitted rows are rescanned on resume.
        ContinuationState::Scan {
            last_key: self.last_key.clone(),
            done: self.store_done && self.buffer.is_empty(),
        }
    }
}

/// Emits the pinned seed record of a from-record plan exactly once.
pub(crate) struct SeedCursor {
    constituent: usize,
    width: usize,
    record: StoredRecord,
    done: bool,
}

impl SeedCursor {
    pub fn new(constituent: usize, width: usize, record: StoredRecord, done: bool) -> Self {
        Self {
            constituent,
            width,
            record,
            done,
        }
    }
}

impl MatchCursor for SeedCursor {
    fn next(&mut self) -> BoxFuture<'_, ExecutorResult<CursorStep<JoinedMatch>>> {
        Box::pin(async move {
            if self.done {
                return Ok(CursorStep::Stop(StopReason::Exhausted));
            }
            self.done = true;
            Ok(CursorStep::Next(JoinedMatch::seeded(
                self.width,
                self.constituent,
                self.record.clone(),
            )))
        })
    }

    fn continuation(&self) -> ContinuationState {
        ContinuationState::Seed { done: self.done }
    }
}
