//! Schema construction and validation
//!
//! Everything is validated here, at build time: unknown record types,
//! malformed primary keys, join edges against unknown constituents,
//! mismatched key widths, disconnected join graphs, inconsistent synthetic
//! index definitions. Planning never sees an invalid type.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::errors::{SchemaError, SchemaResult};
use super::types::{
    Constituent, ConstituentKey, IndexDefinition, IndexKind, JoinEdge, KeyExpression, RecordType,
    Schema, SyntheticIndexDefinition, SyntheticRecordType,
};

/// Builder for one joined (synthetic) record type
#[derive(Debug, Clone)]
pub struct JoinedTypeBuilder {
    name: String,
    constituents: Vec<Constituent>,
    edges: Vec<JoinEdge>,
}

impl JoinedTypeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constituents: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Adds an inner constituent
    pub fn constituent(mut self, name: impl Into<String>, record_type: impl Into<String>) -> Self {
        self.constituents.push(Constituent {
            name: name.into(),
            record_type: record_type.into(),
            outer: false,
        });
        self
    }

    /// Adds an outer constituent (may be absent from a match)
    pub fn outer_constituent(
        mut self,
        name: impl Into<String>,
        record_type: impl Into<String>,
    ) -> Self {
        self.constituents.push(Constituent {
            name: name.into(),
            record_type: record_type.into(),
            outer: true,
        });
        self
    }

    /// Adds a join edge on two scalar fields
    pub fn join(
        self,
        left: impl Into<String>,
        left_field: impl Into<String>,
        right: impl Into<String>,
        right_field: impl Into<String>,
    ) -> Self {
        self.join_expr(
            left,
            KeyExpression::field(left_field),
            right,
            KeyExpression::field(right_field),
        )
    }

    /// Adds a join edge on arbitrary key expressions
    pub fn join_expr(
        mut self,
        left: impl Into<String>,
        left_key: KeyExpression,
        right: impl Into<String>,
        right_key: KeyExpression,
    ) -> Self {
        self.edges.push(JoinEdge {
            left: left.into(),
            left_key,
            right: right.into(),
            right_key,
        });
        self
    }

    fn validate(&self) -> SchemaResult<()> {
        if self.constituents.len() < 2 {
            return Err(SchemaError::too_few_constituents(&self.name));
        }
        let mut names = HashSet::new();
        for c in &self.constituents {
            if !names.insert(c.name.as_str()) {
                return Err(SchemaError::duplicate_constituent(&self.name, &c.name));
            }
        }
        for edge in &self.edges {
            for side in [&edge.left, &edge.right] {
                if !names.contains(side.as_str()) {
                    return Err(SchemaError::unknown_constituent(&self.name, side));
                }
            }
            let left_width = edge.left_key.column_count();
            let right_width = edge.right_key.column_count();
            if left_width != right_width {
                return Err(SchemaError::key_arity_mismatch(
                    &self.name, left_width, right_width,
                ));
            }
        }
        self.validate_connected()
    }

    /// Edges, as an undirected graph, must connect all constituents.
    fn validate_connected(&self) -> SchemaResult<()> {
        let mut reached = HashSet::new();
        reached.insert(self.constituents[0].name.as_str());
        loop {
            let before = reached.len();
            for edge in &self.edges {
                if reached.contains(edge.left.as_str()) {
                    reached.insert(edge.right.as_str());
                }
                if reached.contains(edge.right.as_str()) {
                    reached.insert(edge.left.as_str());
                }
            }
            if reached.len() == before {
                break;
            }
        }
        for c in &self.constituents {
            if !reached.contains(c.name.as_str()) {
                return Err(SchemaError::disconnected(&self.name, &c.name));
            }
        }
        Ok(())
    }
}

/// Builder for a complete schema snapshot
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    record_types: Vec<RecordType>,
    indexes: Vec<IndexDefinition>,
    joined: Vec<JoinedTypeBuilder>,
    synthetic_indexes: Vec<SyntheticIndexDefinition>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a stored record type with its primary key expression
    pub fn record_type(mut self, name: impl Into<String>, primary_key: KeyExpression) -> Self {
        self.record_types.push(RecordType {
            name: name.into(),
            primary_key,
        });
        self
    }

    /// Declares a value index on a stored record type
    pub fn index(
        mut self,
        name: impl Into<String>,
        record_type: impl Into<String>,
        root: KeyExpression,
    ) -> Self {
        self.indexes.push(IndexDefinition {
            name: name.into(),
            record_type: record_type.into(),
            root,
        });
        self
    }

    /// Declares a joined record type
    pub fn joined_type(mut self, joined: JoinedTypeBuilder) -> Self {
        self.joined.push(joined);
        self
    }

    /// Declares a value index over a synthetic type
    pub fn synthetic_index(
        mut self,
        name: impl Into<String>,
        synthetic_type: impl Into<String>,
        columns: Vec<ConstituentKey>,
    ) -> Self {
        self.synthetic_indexes.push(SyntheticIndexDefinition {
            name: name.into(),
            synthetic_type: synthetic_type.into(),
            kind: IndexKind::Value,
            columns,
            sum_field: None,
        });
        self
    }

    /// Declares a SUM index over a synthetic type, grouped by `columns`
    pub fn synthetic_sum_index(
        mut self,
        name: impl Into<String>,
        synthetic_type: impl Into<String>,
        columns: Vec<ConstituentKey>,
        sum_field: ConstituentKey,
    ) -> Self {
        self.synthetic_indexes.push(SyntheticIndexDefinition {
            name: name.into(),
            synthetic_type: synthetic_type.into(),
            kind: IndexKind::Sum,
            columns,
            sum_field: Some(sum_field),
        });
        self
    }

    /// Validates everything and produces the immutable snapshot.
    ///
    /// Joined types receive ordinals -1, -2, .. in declaration order.
    pub fn build(self) -> SchemaResult<Arc<Schema>> {
        let mut record_type_positions = HashMap::new();
        for (i, rt) in self.record_types.iter().enumerate() {
            if record_type_positions.insert(rt.name.clone(), i).is_some() {
                return Err(SchemaError::duplicate_type(&rt.name));
            }
            if rt.primary_key.fans_out() || rt.primary_key.column_count() == 0 {
                return Err(SchemaError::invalid_primary_key(&rt.name));
            }
        }

        let mut index_names = HashSet::new();
        for index in &self.indexes {
            if !index_names.insert(index.name.as_str()) {
                return Err(SchemaError::duplicate_index(&index.name));
            }
            if !record_type_positions.contains_key(&index.record_type) {
                return Err(SchemaError::unknown_record_type(&index.record_type));
            }
        }

        let mut synthetic_types = Vec::with_capacity(self.joined.len());
        let mut synthetic_names = HashSet::new();
        for (i, joined) in self.joined.iter().enumerate() {
            if !synthetic_names.insert(joined.name.as_str())
                || record_type_positions.contains_key(&joined.name)
            {
                return Err(SchemaError::duplicate_type(&joined.name));
            }
            for c in &joined.constituents {
                if !record_type_positions.contains_key(&c.record_type) {
                    return Err(SchemaError::unknown_record_type(&c.record_type));
                }
            }
            joined.validate()?;
            synthetic_types.push(Arc::new(SyntheticRecordType {
                name: joined.name.clone(),
                ordinal: -((i as i64) + 1),
                constituents: joined.constituents.clone(),
                edges: joined.edges.clone(),
            }));
        }

        for def in &self.synthetic_indexes {
            if !index_names.insert(def.name.as_str()) {
                return Err(SchemaError::duplicate_index(&def.name));
            }
            let ty = synthetic_types
                .iter()
                .find(|t| t.name == def.synthetic_type)
                .ok_or_else(|| SchemaError::unknown_record_type(&def.synthetic_type))?;
            for column in def.columns.iter().chain(def.sum_field.iter()) {
                if ty.constituent_index(&column.constituent).is_none() {
                    return Err(SchemaError::unknown_constituent(
                        &ty.name,
                        &column.constituent,
                    ));
                }
            }
            match def.kind {
                IndexKind::Value => {
                    if def.sum_field.is_some() {
                        return Err(SchemaError::invalid_index(
                            &def.name,
                            "value index cannot declare a summed field",
                        ));
                    }
                }
                IndexKind::Sum => {
                    if def.sum_field.is_none() {
                        return Err(SchemaError::invalid_index(
                            &def.name,
                            "sum index requires a summed field",
                        ));
                    }
                }
            }
        }

        Ok(Arc::new(Schema {
            record_types: self.record_types,
            indexes: self.indexes,
            synthetic_types,
            synthetic_indexes: self.synthetic_indexes,
            record_type_positions,
        }))
    }
}
