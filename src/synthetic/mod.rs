//! Synthetic record assembly
//!
//! A synthetic record is assembled transiently from matched constituents;
//! it is never persisted. Its primary key is
//! `(type ordinal, key_1 | null, .., key_n | null)` in constituent
//! declaration order - index definitions over synthetic types depend on
//! this exact shape.

mod record;

pub use record::{JoinedMatch, SyntheticRecord};
