//! Schema metadata types
//!
//! Records are JSON documents; key expressions extract ordered key values
//! from them. A key expression evaluates to a list of key instances - one
//! for scalar expressions, zero or more when a fan-out expression walks a
//! repeated field.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::tuple::TupleValue;

/// Key expression over a record value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyExpression {
    /// Single scalar field; a missing field evaluates to null
    Field(String),
    /// Concatenation of sub-expressions into one composite key
    Concat(Vec<KeyExpression>),
    /// One instance per element of a repeated field; the optional child
    /// expression is evaluated against each element
    FanOut(String, Option<Box<KeyExpression>>),
}

impl KeyExpression {
    /// Scalar field expression
    pub fn field(name: impl Into<String>) -> Self {
        KeyExpression::Field(name.into())
    }

    /// Composite expression
    pub fn concat(parts: impl IntoIterator<Item = KeyExpression>) -> Self {
        KeyExpression::Concat(parts.into_iter().collect())
    }

    /// Fan-out over a repeated scalar field
    pub fn fan_out(name: impl Into<String>) -> Self {
        KeyExpression::FanOut(name.into(), None)
    }

    /// Fan-out over a repeated message field, evaluating `child` per element
    pub fn fan_out_nested(name: impl Into<String>, child: KeyExpression) -> Self {
        KeyExpression::FanOut(name.into(), Some(Box::new(child)))
    }

    /// Number of columns one instance of this expression produces
    pub fn column_count(&self) -> usize {
        match self {
            KeyExpression::Field(_) => 1,
            KeyExpression::Concat(parts) => parts.iter().map(|p| p.column_count()).sum(),
            KeyExpression::FanOut(_, None) => 1,
            KeyExpression::FanOut(_, Some(child)) => child.column_count(),
        }
    }

    /// True if evaluation can yield more than one instance per record
    pub fn fans_out(&self) -> bool {
        match self {
            KeyExpression::Field(_) => false,
            KeyExpression::Concat(parts) => parts.iter().any(|p| p.fans_out()),
            KeyExpression::FanOut(_, _) => true,
        }
    }

    /// Leaf units of this expression, with `Concat` flattened.
    ///
    /// Index matching compares these units positionally.
    pub fn units(&self) -> Vec<&KeyExpression> {
        match self {
            KeyExpression::Concat(parts) => parts.iter().flat_map(|p| p.units()).collect(),
            other => vec![other],
        }
    }

    /// Evaluate against a record value.
    ///
    /// Returns every key instance in record order. Scalar expressions yield
    /// exactly one instance; a missing scalar field yields a null column; a
    /// missing or empty repeated field yields zero instances. `Concat`
    /// yields the cross product of its parts.
    pub fn evaluate(&self, record: &Value) -> Vec<Vec<TupleValue>> {
        match self {
            KeyExpression::Field(name) => {
                let v = record
                    .get(name)
                    .and_then(TupleValue::from_json)
                    .unwrap_or(TupleValue::Null);
                vec![vec![v]]
            }
            KeyExpression::Concat(parts) => {
                let mut instances: Vec<Vec<TupleValue>> = vec![Vec::new()];
                for part in parts {
                    let part_instances = part.evaluate(record);
                    let mut next = Vec::with_capacity(instances.len() * part_instances.len());
                    for prefix in &instances {
                        for inst in &part_instances {
                            let mut combined = prefix.clone();
                            combined.extend(inst.iter().cloned());
                            next.push(combined);
                        }
                    }
                    instances = next;
                }
                instances
            }
            KeyExpression::FanOut(name, child) => {
                let elements = match record.get(name) {
                    Some(Value::Array(items)) => items,
                    _ => return Vec::new(),
                };
                let mut instances = Vec::new();
                for element in elements {
                    match child {
                        None => {
                            let v = TupleValue::from_json(element).unwrap_or(TupleValue::Null);
                            instances.push(vec![v]);
                        }
                        Some(child) => instances.extend(child.evaluate(element)),
                    }
                }
                instances
            }
        }
    }
}

impl fmt::Display for KeyExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyExpression::Field(name) => write!(f, "{}", name),
            KeyExpression::Concat(parts) => {
                write!(f, "concat(")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", part)?;
                }
                write!(f, ")")
            }
            KeyExpression::FanOut(name, None) => write!(f, "{}[]", name),
            KeyExpression::FanOut(name, Some(child)) => write!(f, "{}[].{}", name, child),
        }
    }
}

/// A stored record type known to the schema
#[derive(Debug, Clone)]
pub struct RecordType {
    /// Type name, unique across the schema
    pub name: String,
    /// Primary key expression; must be scalar
    pub primary_key: KeyExpression,
}

/// A value index over one stored record type.
///
/// Entry key shape: `(value columns.., primary_key)`. The planner's join
/// lookup strategies are chosen from these definitions.
#[derive(Debug, Clone)]
pub struct IndexDefinition {
    /// Index name, unique across the schema
    pub name: String,
    /// Indexed record type
    pub record_type: String,
    /// Indexed key expression
    pub root: KeyExpression,
}

/// One stored record type participating in a joined type
#[derive(Debug, Clone)]
pub struct Constituent {
    /// Role name, unique within the joined type
    pub name: String,
    /// Underlying stored record type
    pub record_type: String,
    /// True if this side may legitimately be absent from a match
    pub outer: bool,
}

/// One join edge between two constituents
#[derive(Debug, Clone)]
pub struct JoinEdge {
    pub left: String,
    pub left_key: KeyExpression,
    pub right: String,
    pub right_key: KeyExpression,
}

/// A joined (synthetic) record type.
///
/// Edges form an undirected graph over the constituents; the graph must be
/// connected. Edges beyond a spanning tree are enforced as post-match
/// filters by the planner.
#[derive(Debug, Clone)]
pub struct SyntheticRecordType {
    /// Type name, unique across the schema
    pub name: String,
    /// Stable negative ordinal, leads every synthetic primary key
    pub ordinal: i64,
    /// Constituents in declaration order
    pub constituents: Vec<Constituent>,
    /// Join edges in declaration order
    pub edges: Vec<JoinEdge>,
}

impl SyntheticRecordType {
    /// Position of a constituent by role name
    pub fn constituent_index(&self, name: &str) -> Option<usize> {
        self.constituents.iter().position(|c| c.name == name)
    }

    /// True if any edge key expression fans out
    pub fn has_fan_out_edge(&self) -> bool {
        self.edges
            .iter()
            .any(|e| e.left_key.fans_out() || e.right_key.fans_out())
    }
}

/// Kind of index over a synthetic type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Plain value index: one entry per synthetic record
    Value,
    /// Group-by running total, maintained as deltas
    Sum,
}

/// A key expression applied to one constituent of a synthetic record
#[derive(Debug, Clone)]
pub struct ConstituentKey {
    pub constituent: String,
    pub expr: KeyExpression,
}

impl ConstituentKey {
    pub fn new(constituent: impl Into<String>, expr: KeyExpression) -> Self {
        Self {
            constituent: constituent.into(),
            expr,
        }
    }
}

/// An index over a synthetic type, maintained by the bridge on every
/// constituent write.
#[derive(Debug, Clone)]
pub struct SyntheticIndexDefinition {
    /// Index name, unique across the schema
    pub name: String,
    /// Indexed synthetic type
    pub synthetic_type: String,
    pub kind: IndexKind,
    /// Value columns (Value kind) or grouping columns (Sum kind)
    pub columns: Vec<ConstituentKey>,
    /// Summed integer field; Sum kind only
    pub sum_field: Option<ConstituentKey>,
}

/// Immutable schema snapshot.
///
/// One snapshot per schema version; plans hold it read-only through an
/// `Arc`. There is no other ambient schema state.
#[derive(Debug)]
pub struct Schema {
    pub(crate) record_types: Vec<RecordType>,
    pub(crate) indexes: Vec<IndexDefinition>,
    pub(crate) synthetic_types: Vec<Arc<SyntheticRecordType>>,
    pub(crate) synthetic_indexes: Vec<SyntheticIndexDefinition>,
    pub(crate) record_type_positions: HashMap<String, usize>,
}

impl Schema {
    /// Look up a stored record type
    pub fn record_type(&self, name: &str) -> Option<&RecordType> {
        self.record_type_positions
            .get(name)
            .map(|&i| &self.record_types[i])
    }

    /// Look up a stored-type index by name
    pub fn index(&self, name: &str) -> Option<&IndexDefinition> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// All indexes on one stored record type, in declaration order
    pub fn indexes_for(&self, record_type: &str) -> Vec<&IndexDefinition> {
        self.indexes
            .iter()
            .filter(|i| i.record_type == record_type)
            .collect()
    }

    /// Look up a synthetic type
    pub fn synthetic_type(&self, name: &str) -> Option<&Arc<SyntheticRecordType>> {
        self.synthetic_types.iter().find(|t| t.name == name)
    }

    /// All synthetic types, in declaration order
    pub fn synthetic_types(&self) -> &[Arc<SyntheticRecordType>] {
        &self.synthetic_types
    }

    /// Look up a synthetic index by name
    pub fn synthetic_index(&self, name: &str) -> Option<&SyntheticIndexDefinition> {
        self.synthetic_indexes.iter().find(|i| i.name == name)
    }

    /// All indexes on one synthetic type, in declaration order
    pub fn synthetic_indexes_for(&self, synthetic_type: &str) -> Vec<&SyntheticIndexDefinition> {
        self.synthetic_indexes
            .iter()
            .filter(|i| i.synthetic_type == synthetic_type)
            .collect()
    }
}
