//! Execution limits and scan budget
//!
//! Limits are caller-supplied per execution. The row limit bounds emitted
//! synthetic records; the scan and time budgets are cooperative, consulted
//! by every extent scan at its page boundaries and consumed by every
//! lookup. Reaching any of them stops the cursor with a resumable
//! continuation rather than an error.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::cursor::StopReason;

const DEFAULT_PIPELINE_DEPTH: usize = 8;

/// Limits on one plan execution.
#[derive(Debug, Clone)]
pub struct ExecuteLimits {
    /// Maximum synthetic records emitted; `None` runs to completion
    pub row_limit: Option<usize>,
    /// Budget of store rows fetched across all scans and lookups; once
    /// consumed, the execution pauses at the next extent-scan page
    /// boundary (in-flight lookups finish, so resumption always makes
    /// progress)
    pub scan_limit: Option<usize>,
    /// Wall-clock budget, checked at the same page boundaries
    pub time_limit: Option<Duration>,
    /// How many inner lookups the join keeps in flight; trades peak
    /// resource use for throughput
    pub pipeline_depth: usize,
}

impl ExecuteLimits {
    pub fn with_row_limit(mut self, limit: usize) -> Self {
        self.row_limit = Some(limit);
        self
    }

    pub fn with_scan_limit(mut self, limit: usize) -> Self {
        self.scan_limit = Some(limit);
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub fn with_pipeline_depth(mut self, depth: usize) -> Self {
        self.pipeline_depth = depth.max(1);
        self
    }
}

impl Default for ExecuteLimits {
    fn default() -> Self {
        Self {
            row_limit: None,
            scan_limit: None,
            time_limit: None,
            pipeline_depth: DEFAULT_PIPELINE_DEPTH,
        }
    }
}

/// Shared scan budget for one execution.
///
/// Every scan and lookup consumes it; extent scans consult it before each
/// page fetch. Consumption may overshoot by in-flight pipelined lookups;
/// resumption positions stay exact regardless.
#[derive(Debug)]
pub(crate) struct ScanBudget {
    limit: Option<usize>,
    deadline: Option<Instant>,
    used: AtomicUsize,
}

impl ScanBudget {
    pub fn new(limit: Option<usize>, time_limit: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            limit,
            deadline: time_limit.map(|d| Instant::now() + d),
            used: AtomicUsize::new(0),
        })
    }

    /// Why fetching must pause now, if at all.
    pub fn pause(&self) -> Option<StopReason> {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Some(StopReason::TimeLimit);
            }
        }
        if let Some(limit) = self.limit {
            if self.used.load(Ordering::Relaxed) >= limit {
                return Some(StopReason::ScanLimit);
            }
        }
        None
    }

    pub fn consume(&self, rows: usize) {
        if self.limit.is_some() && rows > 0 {
            self.used.fetch_add(rows, Ordering::Relaxed);
        }
    }
}
