//! In-memory reference store
//!
//! Ordered `BTreeMap` extents and index trees behind snapshot
//! transactions: `begin` clones the current state, `commit` publishes it,
//! dropping the transaction discards every change, including index deltas
//! written by the maintenance bridge.
//!
//! `put_record` and `remove_record` keep the stored-type value indexes
//! consistent; that is the store collaborator's contract, synthetic
//! indexes stay the bridge's job.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use serde_json::Value;

use super::errors::{StoreError, StoreResult};
use super::record::{IndexEntry, StoredRecord};
use super::transaction::StoreTransaction;
use crate::schema::Schema;
use crate::tuple::TupleValue;

#[derive(Debug, Clone, Default)]
struct StoreData {
    /// Per record type, primary key -> record value
    records: HashMap<String, BTreeMap<TupleValue, Value>>,
    /// Per index name, entry key -> entry value
    indexes: HashMap<String, BTreeMap<TupleValue, TupleValue>>,
}

/// In-memory ordered store bound to one schema snapshot.
#[derive(Debug)]
pub struct MemoryStore {
    schema: Arc<Schema>,
    data: Mutex<StoreData>,
}

impl MemoryStore {
    pub fn new(schema: Arc<Schema>) -> Arc<Self> {
        Arc::new(Self {
            schema,
            data: Mutex::new(StoreData::default()),
        })
    }

    /// Opens a snapshot transaction.
    pub fn begin(self: &Arc<Self>) -> Arc<MemoryTransaction> {
        let snapshot = self.data.lock().expect("store lock poisoned").clone();
        Arc::new(MemoryTransaction {
            store: Arc::clone(self),
            schema: Arc::clone(&self.schema),
            data: Mutex::new(snapshot),
        })
    }
}

/// One snapshot transaction over a [`MemoryStore`].
///
/// Dropping without `commit` aborts: nothing reaches the store.
#[derive(Debug)]
pub struct MemoryTransaction {
    store: Arc<MemoryStore>,
    schema: Arc<Schema>,
    data: Mutex<StoreData>,
}

impl MemoryTransaction {
    /// Publishes this transaction's state to the store.
    pub fn commit(&self) -> StoreResult<()> {
        let snapshot = self.data.lock().expect("txn lock poisoned").clone();
        *self.store.data.lock().expect("store lock poisoned") = snapshot;
        Ok(())
    }

    fn check_record_type(&self, record_type: &str) -> StoreResult<()> {
        if self.schema.record_type(record_type).is_none() {
            return Err(StoreError::UnknownRecordType(record_type.to_string()));
        }
        Ok(())
    }

    /// Entry keys a record contributes to one stored-type index.
    fn stored_index_keys(
        root: &crate::schema::KeyExpression,
        record: &StoredRecord,
    ) -> Vec<TupleValue> {
        root.evaluate(&record.value)
            .into_iter()
            .map(|mut columns| {
                columns.push(record.primary_key.clone());
                TupleValue::Tuple(columns)
            })
            .collect()
    }

    fn unindex_stored(&self, data: &mut StoreData, record: &StoredRecord) {
        for index in self.schema.indexes_for(&record.record_type) {
            let tree = data.indexes.entry(index.name.clone()).or_default();
            for key in Self::stored_index_keys(&index.root, record) {
                tree.remove(&key);
            }
        }
    }

    fn index_stored(&self, data: &mut StoreData, record: &StoredRecord) {
        for index in self.schema.indexes_for(&record.record_type) {
            let tree = data.indexes.entry(index.name.clone()).or_default();
            for key in Self::stored_index_keys(&index.root, record) {
                tree.insert(key, TupleValue::Tuple(Vec::new()));
            }
        }
    }
}

impl StoreTransaction for MemoryTransaction {
    fn scan_records<'a>(
        &'a self,
        record_type: &'a str,
        after: Option<&'a TupleValue>,
        limit: usize,
    ) -> BoxFuture<'a, StoreResult<Vec<StoredRecord>>> {
        Box::pin(async move {
            self.check_record_type(record_type)?;
            let data = self.data.lock().expect("txn lock poisoned");
            let extent = match data.records.get(record_type) {
                Some(extent) => extent,
                None => return Ok(Vec::new()),
            };
            let lower = match after {
                Some(key) => Bound::Excluded(key.clone()),
                None => Bound::Unbounded,
            };
            Ok(extent
                .range((lower, Bound::Unbounded))
                .take(limit)
                .map(|(pk, value)| StoredRecord::new(record_type, pk.clone(), value.clone()))
                .collect())
        })
    }

    fn load_record<'a>(
        &'a self,
        record_type: &'a str,
        primary_key: &'a TupleValue,
    ) -> BoxFuture<'a, StoreResult<Option<StoredRecord>>> {
        Box::pin(async move {
            self.check_record_type(record_type)?;
            let data = self.data.lock().expect("txn lock poisoned");
            Ok(data
                .records
                .get(record_type)
                .and_then(|extent| extent.get(primary_key))
                .map(|value| StoredRecord::new(record_type, primary_key.clone(), value.clone())))
        })
    }

    fn scan_index<'a>(
        &'a self,
        index: &'a str,
        prefix: &'a [TupleValue],
        after: Option<&'a TupleValue>,
        limit: usize,
    ) -> BoxFuture<'a, StoreResult<Vec<IndexEntry>>> {
        Box::pin(async move {
            if self.schema.index(index).is_none() && self.schema.synthetic_index(index).is_none() {
                return Err(StoreError::UnknownIndex(index.to_string()));
            }
            let data = self.data.lock().expect("txn lock poisoned");
            let tree = match data.indexes.get(index) {
                Some(tree) => tree,
                None => return Ok(Vec::new()),
            };
            let lower = match after {
                Some(key) => Bound::Excluded(key.clone()),
                None => Bound::Included(TupleValue::Tuple(prefix.to_vec())),
            };
            Ok(tree
                .range((lower, Bound::Unbounded))
                .take_while(|(key, _)| key.starts_with(prefix))
                .take(limit)
                .map(|(key, value)| IndexEntry {
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect())
        })
    }

    fn put_record<'a>(&'a self, record: StoredRecord) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.check_record_type(&record.record_type)?;
            let mut data = self.data.lock().expect("txn lock poisoned");
            let old = data
                .records
                .get(&record.record_type)
                .and_then(|extent| extent.get(&record.primary_key))
                .map(|value| {
                    StoredRecord::new(
                        record.record_type.clone(),
                        record.primary_key.clone(),
                        value.clone(),
                    )
                });
            if let Some(old) = old {
                self.unindex_stored(&mut data, &old);
            }
            self.index_stored(&mut data, &record);
            data.records
                .entry(record.record_type.clone())
                .or_default()
                .insert(record.primary_key.clone(), record.value);
            Ok(())
        })
    }

    fn remove_record<'a>(
        &'a self,
        record_type: &'a str,
        primary_key: &'a TupleValue,
    ) -> BoxFuture<'a, StoreResult<Option<StoredRecord>>> {
        Box::pin(async move {
            self.check_record_type(record_type)?;
            let mut data = self.data.lock().expect("txn lock poisoned");
            let removed = data
                .records
                .get_mut(record_type)
                .and_then(|extent| extent.remove(primary_key))
                .map(|value| StoredRecord::new(record_type, primary_key.clone(), value));
            if let Some(removed) = &removed {
                self.unindex_stored(&mut data, removed);
            }
            Ok(removed)
        })
    }

    fn index_entry<'a>(
        &'a self,
        index: &'a str,
        key: &'a TupleValue,
    ) -> BoxFuture<'a, StoreResult<Option<TupleValue>>> {
        Box::pin(async move {
            let data = self.data.lock().expect("txn lock poisoned");
            Ok(data.indexes.get(index).and_then(|tree| tree.get(key)).cloned())
        })
    }

    fn put_index_entry<'a>(
        &'a self,
        index: &'a str,
        key: TupleValue,
        value: TupleValue,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let mut data = self.data.lock().expect("txn lock poisoned");
            data.indexes
                .entry(index.to_string())
                .or_default()
                .insert(key, value);
            Ok(())
        })
    }

    fn clear_index_entry<'a>(
        &'a self,
        index: &'a str,
        key: &'a TupleValue,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let mut data = self.data.lock().expect("txn lock poisoned");
            if let Some(tree) = data.indexes.get_mut(index) {
                tree.remove(key);
            }
            Ok(())
        })
    }
}
