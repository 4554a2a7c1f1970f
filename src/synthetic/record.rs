//! Synthetic record and partial match shapes

use std::sync::Arc;

use crate::schema::SyntheticRecordType;
use crate::store::StoredRecord;
use crate::tuple::TupleValue;

/// A partially or fully bound combination of constituents.
///
/// One slot per constituent in declaration order; `None` is legal only for
/// outer constituents (or slots not yet bound during execution).
#[derive(Debug, Clone)]
pub struct JoinedMatch {
    pub slots: Vec<Option<StoredRecord>>,
}

impl JoinedMatch {
    /// An empty match with `width` unbound slots
    pub fn empty(width: usize) -> Self {
        Self {
            slots: vec![None; width],
        }
    }

    /// A match with one slot bound
    pub fn seeded(width: usize, slot: usize, record: StoredRecord) -> Self {
        let mut m = Self::empty(width);
        m.slots[slot] = Some(record);
        m
    }

    /// Returns a copy with one more slot bound
    pub fn with_slot(&self, slot: usize, record: StoredRecord) -> Self {
        let mut m = self.clone();
        m.slots[slot] = Some(record);
        m
    }

    /// The synthetic primary key of this combination under `ty`.
    ///
    /// Shape: `(ordinal, pk_1 | null, .., pk_n | null)`.
    pub fn primary_key(&self, ty: &SyntheticRecordType) -> TupleValue {
        let mut elements = Vec::with_capacity(self.slots.len() + 1);
        elements.push(TupleValue::Int(ty.ordinal));
        for slot in &self.slots {
            elements.push(match slot {
                Some(record) => record.primary_key.clone(),
                None => TupleValue::Null,
            });
        }
        TupleValue::Tuple(elements)
    }
}

/// A materialized synthetic record.
#[derive(Debug, Clone)]
pub struct SyntheticRecord {
    synthetic_type: Arc<SyntheticRecordType>,
    primary_key: TupleValue,
    constituents: Vec<Option<StoredRecord>>,
}

impl SyntheticRecord {
    /// Assembles a record from a complete match.
    pub fn assemble(synthetic_type: Arc<SyntheticRecordType>, m: JoinedMatch) -> Self {
        let primary_key = m.primary_key(&synthetic_type);
        Self {
            synthetic_type,
            primary_key,
            constituents: m.slots,
        }
    }

    pub fn synthetic_type(&self) -> &Arc<SyntheticRecordType> {
        &self.synthetic_type
    }

    pub fn primary_key(&self) -> &TupleValue {
        &self.primary_key
    }

    /// Constituent record by role name; `None` for unknown roles or
    /// unmatched outer sides.
    pub fn constituent(&self, name: &str) -> Option<&StoredRecord> {
        let slot = self.synthetic_type.constituent_index(name)?;
        self.constituents[slot].as_ref()
    }

    /// All constituent slots in declaration order
    pub fn constituents(&self) -> &[Option<StoredRecord>] {
        &self.constituents
    }
}
