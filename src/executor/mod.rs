//! Execution subsystem for synthdb
//!
//! Consumes plans and produces lazy sequences of synthetic records.
//!
//! # Execution model
//!
//! - Single-pass, forward-only, asynchronous pull; a pull may suspend
//!   during a store round trip, cooperatively, never thread-blocking.
//! - The nested-loop join is the sole concurrency point: a caller-set
//!   pipeline depth bounds in-flight inner lookups.
//! - All reads use one caller-supplied transaction; the executor never
//!   opens, commits, or retries transactions.
//! - Cancellation is cooperative: stop pulling and drop the cursor;
//!   discarded lookups are safe because reads are idempotent.
//!
//! # Continuations
//!
//! Every operator state is self-tagged and nested with its children's;
//! the encoded envelope carries the structural plan hash. Splitting an
//! execution anywhere and resuming yields the identical concatenated
//! sequence; malformed or mismatched continuations are distinct,
//! non-retryable errors.

mod continuation;
mod cursor;
mod errors;
mod filter;
mod join;
mod limits;
mod scan;
mod union;

pub use cursor::{StopReason, SyntheticCursor};
pub use errors::{ExecutorError, ExecutorErrorCode, ExecutorResult};
pub use limits::ExecuteLimits;
