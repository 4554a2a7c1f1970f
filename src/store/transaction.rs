//! Transaction interface to the underlying store
//!
//! Object-safe, asynchronous, pull-friendly: every method returns a boxed
//! future so cursors can suspend cooperatively during store round trips.
//! Scans are paged (after-key + limit), which is the resumption granularity
//! the execution layer builds its continuations on.

use futures_util::future::BoxFuture;

use super::errors::StoreResult;
use super::record::{IndexEntry, StoredRecord};
use crate::tuple::TupleValue;

/// One caller-supplied transaction context.
///
/// The join layer holds this only for the duration of one execution and
/// never outlives it; isolation is inherited entirely from the store.
pub trait StoreTransaction: Send + Sync {
    /// Ordered scan of a record type extent, strictly after `after`,
    /// returning at most `limit` records in primary key order.
    fn scan_records<'a>(
        &'a self,
        record_type: &'a str,
        after: Option<&'a TupleValue>,
        limit: usize,
    ) -> BoxFuture<'a, StoreResult<Vec<StoredRecord>>>;

    /// Point get by primary key.
    fn load_record<'a>(
        &'a self,
        record_type: &'a str,
        primary_key: &'a TupleValue,
    ) -> BoxFuture<'a, StoreResult<Option<StoredRecord>>>;

    /// Ordered scan of a value index: entries whose key starts with
    /// `prefix`, strictly after `after` (a full entry key), at most
    /// `limit` entries in key order.
    fn scan_index<'a>(
        &'a self,
        index: &'a str,
        prefix: &'a [TupleValue],
        after: Option<&'a TupleValue>,
        limit: usize,
    ) -> BoxFuture<'a, StoreResult<Vec<IndexEntry>>>;

    /// Raw record write. Stored-type index upkeep is the store's job;
    /// synthetic index upkeep is the maintenance bridge's.
    fn put_record<'a>(&'a self, record: StoredRecord) -> BoxFuture<'a, StoreResult<()>>;

    /// Raw record removal, returning the removed record if present.
    fn remove_record<'a>(
        &'a self,
        record_type: &'a str,
        primary_key: &'a TupleValue,
    ) -> BoxFuture<'a, StoreResult<Option<StoredRecord>>>;

    /// Point read of one index entry value.
    fn index_entry<'a>(
        &'a self,
        index: &'a str,
        key: &'a TupleValue,
    ) -> BoxFuture<'a, StoreResult<Option<TupleValue>>>;

    /// Insert or replace one index entry.
    fn put_index_entry<'a>(
        &'a self,
        index: &'a str,
        key: TupleValue,
        value: TupleValue,
    ) -> BoxFuture<'a, StoreResult<()>>;

    /// Remove one index entry if present.
    fn clear_index_entry<'a>(
        &'a self,
        index: &'a str,
        key: &'a TupleValue,
    ) -> BoxFuture<'a, StoreResult<()>>;
}
