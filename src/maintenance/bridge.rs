//! The index maintenance bridge
//!
//! `save_record` and `delete_record` are the write path for constituent
//! records. On every write the bridge executes the reverse plan for the
//! old and new record versions, diffs the derived index entries, and
//! applies the difference within the same transaction. A save can change
//! the keys driving the join, so both versions must be evaluated; the
//! pinned record is never re-read from the store, which makes the old
//! side exact even after the write landed.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use super::errors::{MaintenanceError, MaintenanceResult};
use crate::executor::ExecuteLimits;
use crate::observability::{Logger, Severity, EVENT_INDEX_BUILT, EVENT_INDEX_DELTA};
use crate::planner::SyntheticRecordPlanner;
use crate::schema::{IndexKind, Schema, SyntheticIndexDefinition};
use crate::store::{StoreTransaction, StoredRecord};
use crate::synthetic::SyntheticRecord;
use crate::tuple::TupleValue;

/// Keeps synthetic-type indexes consistent on constituent writes.
pub struct IndexBridge {
    schema: Arc<Schema>,
    planner: SyntheticRecordPlanner,
}

impl IndexBridge {
    pub fn new(schema: Arc<Schema>) -> Self {
        let planner = SyntheticRecordPlanner::new(Arc::clone(&schema));
        Self { schema, planner }
    }

    /// Saves one record and applies all synthetic index deltas inside the
    /// caller's transaction. Returns the stored record.
    pub async fn save_record(
        &self,
        tx: &Arc<dyn StoreTransaction>,
        record_type: &str,
        value: Value,
    ) -> MaintenanceResult<StoredRecord> {
        let primary_key = self.derive_primary_key(record_type, &value)?;
        let old = tx.load_record(record_type, &primary_key).await?;
        let record = StoredRecord::new(record_type, primary_key, value);
        tx.put_record(record.clone()).await?;
        self.reconcile(tx, record_type, old.as_ref(), Some(&record))
            .await?;
        Ok(record)
    }

    /// Deletes one record and removes its synthetic index contributions.
    /// Returns whether the record existed.
    pub async fn delete_record(
        &self,
        tx: &Arc<dyn StoreTransaction>,
        record_type: &str,
        primary_key: &TupleValue,
    ) -> MaintenanceResult<bool> {
        let old = tx.remove_record(record_type, primary_key).await?;
        match old {
            Some(old) => {
                self.reconcile(tx, record_type, Some(&old), None).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Builds a synthetic index from scratch with the full-scan plan.
    pub async fn build_index(
        &self,
        tx: &Arc<dyn StoreTransaction>,
        index_name: &str,
    ) -> MaintenanceResult<usize> {
        let def = self
            .schema
            .synthetic_index(index_name)
            .ok_or_else(|| MaintenanceError::UnknownIndex(index_name.to_string()))?
            .clone();
        let plan = self.planner.scan_for_type(&def.synthetic_type)?;
        let mut cursor = plan.execute(Arc::clone(tx), None, ExecuteLimits::default())?;
        let mut count = 0usize;
        let mut totals: BTreeMap<TupleValue, i64> = BTreeMap::new();
        while let Some(record) = cursor.next().await? {
            count += 1;
            match def.kind {
                IndexKind::Value => {
                    for key in value_entries(&def, &record) {
                        tx.put_index_entry(&def.name, key, TupleValue::Tuple(Vec::new()))
                            .await?;
                    }
                }
                IndexKind::Sum => {
                    let contribution = self.sum_contribution(&def, &record)?;
                    for group in group_keys(&def, &record) {
                        *totals.entry(group).or_insert(0) += contribution;
                    }
                }
            }
        }
        for (group, total) in totals {
            if total != 0 {
                tx.put_index_entry(&def.name, group, TupleValue::Int(total))
                    .await?;
            }
        }
        Logger::log(
            Severity::Info,
            EVENT_INDEX_BUILT,
            &[
                ("index", index_name),
                ("records", &count.to_string()),
            ],
        );
        Ok(count)
    }

    fn derive_primary_key(
        &self,
        record_type: &str,
        value: &Value,
    ) -> MaintenanceResult<TupleValue> {
        let rt = self
            .schema
            .record_type(record_type)
            .ok_or_else(|| MaintenanceError::UnknownRecordType(record_type.to_string()))?;
        let mut instances = rt.primary_key.evaluate(value);
        // Validated scalar at schema build: exactly one instance.
        match instances.pop() {
            Some(columns) if instances.is_empty() => Ok(TupleValue::Tuple(columns)),
            _ => Err(MaintenanceError::UnknownRecordType(record_type.to_string())),
        }
    }

    /// Recomputes affected synthetic records for both versions and applies
    /// index deltas.
    async fn reconcile(
        &self,
        tx: &Arc<dyn StoreTransaction>,
        record_type: &str,
        old: Option<&StoredRecord>,
        new: Option<&StoredRecord>,
    ) -> MaintenanceResult<()> {
        let affected: Vec<&SyntheticIndexDefinition> = self
            .schema
            .synthetic_indexes
            .iter()
            .filter(|def| {
                self.schema
                    .synthetic_type(&def.synthetic_type)
                    .map(|ty| ty.constituents.iter().any(|c| c.record_type == record_type))
                    .unwrap_or(false)
            })
            .collect();
        if affected.is_empty() {
            return Ok(());
        }

        let plan = self.planner.from_stored_type(record_type, true)?;
        let old_records = match old {
            Some(old) => {
                plan.execute(Arc::clone(tx), old, None, ExecuteLimits::default())?
                    .collect()
                    .await?
            }
            None => Vec::new(),
        };
        let new_records = match new {
            Some(new) => {
                plan.execute(Arc::clone(tx), new, None, ExecuteLimits::default())?
                    .collect()
                    .await?
            }
            None => Vec::new(),
        };

        for def in affected {
            let old_of_type: Vec<&SyntheticRecord> = of_type(&old_records, &def.synthetic_type);
            let new_of_type: Vec<&SyntheticRecord> = of_type(&new_records, &def.synthetic_type);
            match def.kind {
                IndexKind::Value => {
                    let old_keys: Vec<TupleValue> = old_of_type
                        .iter()
                        .flat_map(|r| value_entries(def, r))
                        .collect();
                    let new_keys: Vec<TupleValue> = new_of_type
                        .iter()
                        .flat_map(|r| value_entries(def, r))
                        .collect();
                    for key in &old_keys {
                        if !new_keys.contains(key) {
                            tx.clear_index_entry(&def.name, key).await?;
                        }
                    }
                    for key in new_keys {
                        tx.put_index_entry(&def.name, key, TupleValue::Tuple(Vec::new()))
                            .await?;
                    }
                }
                IndexKind::Sum => {
                    let mut deltas: BTreeMap<TupleValue, i64> = BTreeMap::new();
                    for record in &old_of_type {
                        let contribution = self.sum_contribution(def, record)?;
                        for group in group_keys(def, record) {
                            *deltas.entry(group).or_insert(0) -= contribution;
                        }
                    }
                    for record in &new_of_type {
                        let contribution = self.sum_contribution(def, record)?;
                        for group in group_keys(def, record) {
                            *deltas.entry(group).or_insert(0) += contribution;
                        }
                    }
                    let mut applied = 0usize;
                    for (group, delta) in deltas {
                        if delta == 0 {
                            continue;
                        }
                        let current = match tx.index_entry(&def.name, &group).await? {
                            Some(value) => value.as_int().ok_or_else(|| {
                                MaintenanceError::InvalidAggregateValue(def.name.clone())
                            })?,
                            None => 0,
                        };
                        let total = current + delta;
                        if total == 0 {
                            tx.clear_index_entry(&def.name, &group).await?;
                        } else {
                            tx.put_index_entry(&def.name, group, TupleValue::Int(total))
                                .await?;
                        }
                        applied += 1;
                    }
                    if applied > 0 {
                        Logger::log(
                            Severity::Trace,
                            EVENT_INDEX_DELTA,
                            &[
                                ("groups", &applied.to_string()),
                                ("index", &def.name),
                            ],
                        );
                    }
                }
            }
        }
        Ok(())
    }

    fn sum_contribution(
        &self,
        def: &SyntheticIndexDefinition,
        record: &SyntheticRecord,
    ) -> MaintenanceResult<i64> {
        let field = match &def.sum_field {
            Some(field) => field,
            None => return Ok(0),
        };
        let source = match record.constituent(&field.constituent) {
            Some(source) => source,
            None => return Ok(0),
        };
        let instances = field.expr.evaluate(&source.value);
        match instances.first().and_then(|columns| columns.first()) {
            None | Some(TupleValue::Null) => Ok(0),
            Some(TupleValue::Int(v)) => Ok(*v),
            Some(_) => Err(MaintenanceError::InvalidAggregateValue(def.name.clone())),
        }
    }
}

fn of_type<'a>(records: &'a [SyntheticRecord], synthetic_type: &str) -> Vec<&'a SyntheticRecord> {
    records
        .iter()
        .filter(|r| r.synthetic_type().name == synthetic_type)
        .collect()
}

/// Column instances of one synthetic record under an index definition;
/// the cross product when a column fans out, null columns for absent
/// outer constituents.
fn column_instances(
    def: &SyntheticIndexDefinition,
    record: &SyntheticRecord,
) -> Vec<Vec<TupleValue>> {
    let mut instances: Vec<Vec<TupleValue>> = vec![Vec::new()];
    for column in &def.columns {
        let parts = match record.constituent(&column.constituent) {
            Some(source) => column.expr.evaluate(&source.value),
            None => vec![vec![TupleValue::Null; column.expr.column_count()]],
        };
        let mut next = Vec::with_capacity(instances.len() * parts.len());
        for prefix in &instances {
            for part in &parts {
                let mut combined = prefix.clone();
                combined.extend(part.iter().cloned());
                next.push(combined);
            }
        }
        instances = next;
    }
    instances
}

/// Value index entry keys: `(columns.., synthetic primary key)`.
fn value_entries(def: &SyntheticIndexDefinition, record: &SyntheticRecord) -> Vec<TupleValue> {
    column_instances(def, record)
        .into_iter()
        .map(|mut columns| {
            columns.push(record.primary_key().clone());
            TupleValue::Tuple(columns)
        })
        .collect()
}

/// Sum index group keys: `(grouping columns..)`.
fn group_keys(def: &SyntheticIndexDefinition, record: &SyntheticRecord) -> Vec<TupleValue> {
    column_instances(def, record)
        .into_iter()
        .map(TupleValue::Tuple)
        .collect()
}
