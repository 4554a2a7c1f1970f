//! Observability for synthdb
//!
//! Structured JSON logging with deterministic key ordering. Logs are
//! synchronous and unbuffered; one log line is one event.

mod events;
mod logger;

pub use events::{EVENT_INDEX_BUILT, EVENT_INDEX_DELTA};
pub use logger::{Logger, Severity};
