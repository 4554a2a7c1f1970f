//! Ordered tuple values for synthdb
//!
//! Every primary key, index entry key, and join key value is a `TupleValue`.
//! Ordering is deterministic across types: Null < Bool < Int < Float <
//! String < Bytes < Tuple.

mod value;

pub use value::TupleValue;
