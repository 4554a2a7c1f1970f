//! Ordered key element type
//!
//! Primary keys and index keys are tuples of these values. The derived
//! `Ord` gives the store order; floats are kept as total-order bit
//! patterns so `Eq`/`Ord`/`Hash` stay consistent.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single element of an ordered key.
///
/// Cross-type ordering follows variant declaration order:
/// Null < Bool < Int < Float < String < Bytes < Tuple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TupleValue {
    /// Absent or null value (sorts first)
    Null,
    /// Boolean value (false < true)
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Float value (stored as total-order bits)
    Float(u64),
    /// String value
    String(String),
    /// Raw byte string
    Bytes(Vec<u8>),
    /// Nested tuple (primary keys, composite index keys)
    Tuple(Vec<TupleValue>),
}

impl TupleValue {
    /// Create a value from a float.
    ///
    /// Uses bit manipulation for total ordering: negative floats flip all
    /// bits, positive floats flip the sign bit.
    pub fn from_float(v: f64) -> Self {
        let bits = v.to_bits();
        let ordered = if (bits >> 63) == 1 {
            !bits
        } else {
            bits ^ (1 << 63)
        };
        TupleValue::Float(ordered)
    }

    /// Recover the float this value was created from.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            TupleValue::Float(ordered) => {
                let bits = if (ordered >> 63) == 1 {
                    ordered ^ (1 << 63)
                } else {
                    !ordered
                };
                Some(f64::from_bits(bits))
            }
            _ => None,
        }
    }

    /// Create a tuple value.
    pub fn tuple(values: impl IntoIterator<Item = TupleValue>) -> Self {
        TupleValue::Tuple(values.into_iter().collect())
    }

    /// Create a single-element tuple, the shape of a one-column primary key.
    pub fn key1(value: TupleValue) -> Self {
        TupleValue::Tuple(vec![value])
    }

    /// Convert a scalar JSON value.
    ///
    /// Arrays and objects have no scalar key form and become `None`;
    /// JSON null becomes `Null`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(TupleValue::Null),
            serde_json::Value::Bool(b) => Some(TupleValue::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(TupleValue::Int(i))
                } else {
                    n.as_f64().map(TupleValue::from_float)
                }
            }
            serde_json::Value::String(s) => Some(TupleValue::String(s.clone())),
            _ => None,
        }
    }

    /// The elements of a tuple value, or an empty slice for scalars.
    pub fn elements(&self) -> &[TupleValue] {
        match self {
            TupleValue::Tuple(items) => items,
            _ => &[],
        }
    }

    /// True if this is a tuple whose elements start with `prefix`.
    pub fn starts_with(&self, prefix: &[TupleValue]) -> bool {
        match self {
            TupleValue::Tuple(items) => {
                items.len() >= prefix.len() && items[..prefix.len()] == *prefix
            }
            _ => false,
        }
    }

    /// Integer accessor.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            TupleValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for TupleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TupleValue::Null => write!(f, "null"),
            TupleValue::Bool(b) => write!(f, "{}", b),
            TupleValue::Int(i) => write!(f, "{}", i),
            TupleValue::Float(_) => write!(f, "{}", self.as_float().unwrap_or(f64::NAN)),
            TupleValue::String(s) => write!(f, "{:?}", s),
            TupleValue::Bytes(b) => {
                write!(f, "0x")?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            TupleValue::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cross_type_ordering() {
        let values = vec![
            TupleValue::Null,
            TupleValue::Bool(true),
            TupleValue::Int(7),
            TupleValue::from_float(1.5),
            TupleValue::String("a".into()),
            TupleValue::Bytes(vec![0]),
            TupleValue::tuple([TupleValue::Int(1)]),
        ];
        for pair in values.windows(2) {
            assert!(pair[0] < pair[1], "{} < {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_float_total_order() {
        let neg = TupleValue::from_float(-2.5);
        let zero = TupleValue::from_float(0.0);
        let pos = TupleValue::from_float(3.25);
        assert!(neg < zero);
        assert!(zero < pos);
        assert_eq!(pos.as_float(), Some(3.25));
        assert_eq!(neg.as_float(), Some(-2.5));
    }

    #[test]
    fn test_from_json() {
        assert_eq!(TupleValue::from_json(&json!(42)), Some(TupleValue::Int(42)));
        assert_eq!(
            TupleValue::from_json(&json!("x")),
            Some(TupleValue::String("x".into()))
        );
        assert_eq!(TupleValue::from_json(&json!(null)), Some(TupleValue::Null));
        assert_eq!(TupleValue::from_json(&json!([1, 2])), None);
    }

    #[test]
    fn test_prefix_match() {
        let key = TupleValue::tuple([
            TupleValue::Int(1),
            TupleValue::String("a".into()),
            TupleValue::Int(9),
        ]);
        assert!(key.starts_with(&[TupleValue::Int(1)]));
        assert!(key.starts_with(&[TupleValue::Int(1), TupleValue::String("a".into())]));
        assert!(!key.starts_with(&[TupleValue::Int(2)]));
    }

    #[test]
    fn test_tuple_prefix_sorts_before_extension() {
        let short = TupleValue::tuple([TupleValue::Int(1)]);
        let long = TupleValue::tuple([TupleValue::Int(1), TupleValue::Int(0)]);
        assert!(short < long);
    }
}
