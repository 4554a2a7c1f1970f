//! Index Maintenance Tests
//!
//! The bridge keeps indexes over synthetic types consistent on every
//! constituent save and delete, inside the caller's transaction:
//! - value join indexes gain and lose entries with the records they
//!   derive from
//! - SUM aggregate indexes move by exact contribution deltas, including
//!   whole-group moves when a grouping key changes
//! - an aborted transaction applies nothing

use std::sync::Arc;

use serde_json::json;
use synthdb::maintenance::{IndexBridge, MaintenanceError};
use synthdb::schema::{ConstituentKey, JoinedTypeBuilder, KeyExpression, Schema, SchemaBuilder};
use synthdb::store::memory::{MemoryStore, MemoryTransaction};
use synthdb::store::{StoreTransaction, StoredRecord};
use synthdb::tuple::TupleValue;
use uuid::Uuid;

// =============================================================================
// Helper Functions
// =============================================================================

fn int_key(v: i64) -> TupleValue {
    TupleValue::key1(TupleValue::Int(v))
}

fn synth_pk(ordinal: i64, parts: &[Option<i64>]) -> TupleValue {
    let mut elements = vec![TupleValue::Int(ordinal)];
    for part in parts {
        elements.push(match part {
            Some(v) => int_key(*v),
            None => TupleValue::Null,
        });
    }
    TupleValue::Tuple(elements)
}

async fn index_keys(
    tx: &Arc<MemoryTransaction>,
    index: &str,
    prefix: &[TupleValue],
) -> Vec<TupleValue> {
    tx.scan_index(index, prefix, None, 100)
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.key)
        .collect()
}

async fn group_total(tx: &Arc<MemoryTransaction>, index: &str, group: &str) -> Option<i64> {
    tx.index_entry(
        index,
        &TupleValue::tuple([TupleValue::String(group.into())]),
    )
    .await
    .unwrap()
    .and_then(|value| value.as_int())
}

fn simple_other_joined() -> Arc<Schema> {
    SchemaBuilder::new()
        .record_type("MySimpleRecord", KeyExpression::field("rec_no"))
        .record_type("MyOtherRecord", KeyExpression::field("rec_no"))
        .index(
            "MySimpleRecord$other_rec_no",
            "MySimpleRecord",
            KeyExpression::field("other_rec_no"),
        )
        .joined_type(
            JoinedTypeBuilder::new("Simple_Other")
                .constituent("simple", "MySimpleRecord")
                .constituent("other", "MyOtherRecord")
                .join("simple", "other_rec_no", "other", "rec_no"),
        )
        .synthetic_index(
            "simple.str_value_other.num_value_3",
            "Simple_Other",
            vec![
                ConstituentKey::new("simple", KeyExpression::field("str_value")),
                ConstituentKey::new("other", KeyExpression::field("num_value_3")),
            ],
        )
        .build()
        .unwrap()
}

// =============================================================================
// Value Join Indexes
// =============================================================================

/// Entries appear as matching pairs form, follow updates of indexed
/// fields, and vanish when either constituent is deleted.
#[tokio::test]
async fn test_value_join_index_save_update_delete() {
    let schema = simple_other_joined();
    let bridge = IndexBridge::new(Arc::clone(&schema));
    let store = MemoryStore::new(schema);
    let tx = store.begin();
    let dtx: Arc<dyn StoreTransaction> = tx.clone();

    for i in 0..3i64 {
        for j in 0..i {
            bridge
                .save_record(
                    &dtx,
                    "MySimpleRecord",
                    json!({
                        "rec_no": 100 * i + j,
                        "other_rec_no": 1000 + i,
                        "str_value": if (i + j) % 2 == 0 { "even" } else { "odd" },
                    }),
                )
                .await
                .unwrap();
        }
        bridge
            .save_record(
                &dtx,
                "MyOtherRecord",
                json!({ "rec_no": 1000 + i, "num_value_3": i }),
            )
            .await
            .unwrap();
    }

    let prefix = [TupleValue::String("even".into()), TupleValue::Int(2)];
    let keys = index_keys(&tx, "simple.str_value_other.num_value_3", &prefix).await;
    assert_eq!(
        keys,
        vec![TupleValue::tuple([
            TupleValue::String("even".into()),
            TupleValue::Int(2),
            synth_pk(-1, &[Some(200), Some(1002)]),
        ])]
    );

    // Flipping 201 to "even" adds its pair under the new key.
    bridge
        .save_record(
            &dtx,
            "MySimpleRecord",
            json!({ "rec_no": 201, "other_rec_no": 1002, "str_value": "even" }),
        )
        .await
        .unwrap();
    let keys = index_keys(&tx, "simple.str_value_other.num_value_3", &prefix).await;
    assert_eq!(keys.len(), 2);
    assert_eq!(
        keys[1].elements().last(),
        Some(&synth_pk(-1, &[Some(201), Some(1002)]))
    );

    // Deleting the shared other record removes every derived entry.
    assert!(bridge
        .delete_record(&dtx, "MyOtherRecord", &int_key(1002))
        .await
        .unwrap());
    let keys = index_keys(&tx, "simple.str_value_other.num_value_3", &prefix).await;
    assert!(keys.is_empty());
}

/// Building an index over pre-existing data runs the full scan plan once.
#[tokio::test]
async fn test_build_index_over_existing_data() {
    let schema = simple_other_joined();
    let bridge = IndexBridge::new(Arc::clone(&schema));
    let store = MemoryStore::new(schema);
    let tx = store.begin();
    let dtx: Arc<dyn StoreTransaction> = tx.clone();

    // Raw writes bypass the bridge, as if the index were declared later.
    for i in 0..3i64 {
        tx.put_record(StoredRecord::new(
            "MySimpleRecord",
            int_key(i),
            json!({ "rec_no": i, "other_rec_no": 1000 + i, "str_value": "s" }),
        ))
        .await
        .unwrap();
        tx.put_record(StoredRecord::new(
            "MyOtherRecord",
            int_key(1000 + i),
            json!({ "rec_no": 1000 + i, "num_value_3": i * 3 }),
        ))
        .await
        .unwrap();
    }
    assert!(index_keys(&tx, "simple.str_value_other.num_value_3", &[])
        .await
        .is_empty());

    let built = bridge
        .build_index(&dtx, "simple.str_value_other.num_value_3")
        .await
        .unwrap();
    assert_eq!(built, 3);
    let keys = index_keys(&tx, "simple.str_value_other.num_value_3", &[]).await;
    assert_eq!(keys.len(), 3);

    let err = bridge.build_index(&dtx, "ghost").await.unwrap_err();
    assert!(matches!(err, MaintenanceError::UnknownIndex(_)));
}

// =============================================================================
// SUM Aggregate Index (Customer - Order - Item)
// =============================================================================

fn coi_schema() -> Arc<Schema> {
    SchemaBuilder::new()
        .record_type("Customer", KeyExpression::field("uuid"))
        .record_type("Order", KeyExpression::field("uuid"))
        .record_type("Item", KeyExpression::field("uuid"))
        .index(
            "Order$customer_uuid",
            "Order",
            KeyExpression::field("customer_uuid"),
        )
        .index("Item$order_uuid", "Item", KeyExpression::field("order_uuid"))
        .joined_type(
            JoinedTypeBuilder::new("COI")
                .constituent("c", "Customer")
                .constituent("o", "Order")
                .constituent("i", "Item")
                .join("o", "customer_uuid", "c", "uuid")
                .join("i", "order_uuid", "o", "uuid"),
        )
        .synthetic_sum_index(
            "total_price_by_city",
            "COI",
            vec![ConstituentKey::new("c", KeyExpression::field("city"))],
            ConstituentKey::new("i", KeyExpression::field("total_price")),
        )
        .build()
        .unwrap()
}

struct CoiStore {
    bridge: IndexBridge,
    tx: Arc<MemoryTransaction>,
    dtx: Arc<dyn StoreTransaction>,
}

impl CoiStore {
    fn new() -> Self {
        let schema = coi_schema();
        let bridge = IndexBridge::new(Arc::clone(&schema));
        let store = MemoryStore::new(schema);
        let tx = store.begin();
        let dtx: Arc<dyn StoreTransaction> = tx.clone();
        Self { bridge, tx, dtx }
    }

    async fn customer(&self, name: &str, city: &str) -> String {
        let uuid = Uuid::new_v4().to_string();
        self.bridge
            .save_record(
                &self.dtx,
                "Customer",
                json!({ "uuid": uuid, "name": name, "city": city }),
            )
            .await
            .unwrap();
        uuid
    }

    async fn order(&self, customer: &str, order_no: i64) -> String {
        let uuid = Uuid::new_v4().to_string();
        self.bridge
            .save_record(
                &self.dtx,
                "Order",
                json!({ "uuid": uuid, "order_no": order_no, "customer_uuid": customer }),
            )
            .await
            .unwrap();
        uuid
    }

    async fn item(&self, order: &str, item_no: i64, total_price: i64) {
        let uuid = Uuid::new_v4().to_string();
        self.bridge
            .save_record(
                &self.dtx,
                "Item",
                json!({
                    "uuid": uuid,
                    "item_no": item_no,
                    "total_price": total_price,
                    "order_uuid": order,
                }),
            )
            .await
            .unwrap();
    }
}

/// Adding an item moves its group total by exactly its contribution;
/// changing a customer's city moves the whole existing contribution
/// atomically to the new group.
#[tokio::test]
async fn test_aggregate_sum_by_city() {
    let coi = CoiStore::new();

    let jones = coi.customer("Jones", "Boston").await;
    let smith = coi.customer("Smith", "New York").await;
    let lee = coi.customer("Lee", "Boston").await;

    let jones_order = coi.order(&jones, 1001).await;
    coi.item(&jones_order, 123, 200).await;
    coi.item(&jones_order, 456, 1000).await;

    let smith_order = coi.order(&smith, 1002).await;
    coi.item(&smith_order, 789, 200).await;

    let lee_order = coi.order(&lee, 1003).await;
    coi.item(&lee_order, 123, 300).await;

    assert_eq!(
        group_total(&coi.tx, "total_price_by_city", "Boston").await,
        Some(1500)
    );

    // A new order for Lee adds exactly its item's contribution.
    let lee_order_2 = coi.order(&lee, 1004).await;
    coi.item(&lee_order_2, 456, 100).await;
    assert_eq!(
        group_total(&coi.tx, "total_price_by_city", "Boston").await,
        Some(1600)
    );

    // Another item on an existing order.
    coi.item(&lee_order, 789, 100).await;
    assert_eq!(
        group_total(&coi.tx, "total_price_by_city", "Boston").await,
        Some(1700)
    );

    // Moving Lee to San Francisco relocates his entire contribution.
    coi.bridge
        .save_record(
            &coi.dtx,
            "Customer",
            json!({ "uuid": lee, "name": "Lee", "city": "San Francisco" }),
        )
        .await
        .unwrap();
    assert_eq!(
        group_total(&coi.tx, "total_price_by_city", "Boston").await,
        Some(1200)
    );
    assert_eq!(
        group_total(&coi.tx, "total_price_by_city", "San Francisco").await,
        Some(500)
    );
    assert_eq!(
        group_total(&coi.tx, "total_price_by_city", "New York").await,
        Some(200)
    );

    let groups = index_keys(&coi.tx, "total_price_by_city", &[]).await;
    assert_eq!(groups.len(), 3);
}

/// Deleting an item subtracts its contribution; deleting the last
/// contributor clears the group entry.
#[tokio::test]
async fn test_aggregate_delete_contribution() {
    let coi = CoiStore::new();
    let ann = coi.customer("Ann", "Kyoto").await;
    let order = coi.order(&ann, 1).await;
    coi.item(&order, 1, 40).await;
    coi.item(&order, 2, 60).await;
    assert_eq!(
        group_total(&coi.tx, "total_price_by_city", "Kyoto").await,
        Some(100)
    );

    let items = coi.tx.scan_records("Item", None, 10).await.unwrap();
    let first = items
        .iter()
        .find(|r| r.value["total_price"] == json!(40))
        .unwrap();
    coi.bridge
        .delete_record(&coi.dtx, "Item", &first.primary_key)
        .await
        .unwrap();
    assert_eq!(
        group_total(&coi.tx, "total_price_by_city", "Kyoto").await,
        Some(60)
    );

    let second = coi
        .tx
        .scan_records("Item", None, 10)
        .await
        .unwrap()
        .into_iter()
        .next()
        .unwrap();
    coi.bridge
        .delete_record(&coi.dtx, "Item", &second.primary_key)
        .await
        .unwrap();
    assert_eq!(
        group_total(&coi.tx, "total_price_by_city", "Kyoto").await,
        None
    );
}

// =============================================================================
// Transactional Behavior
// =============================================================================

/// Index deltas live and die with the enclosing transaction.
#[tokio::test]
async fn test_abort_discards_index_deltas() {
    let schema = simple_other_joined();
    let bridge = IndexBridge::new(Arc::clone(&schema));
    let store = MemoryStore::new(schema);

    {
        let tx = store.begin();
        let dtx: Arc<dyn StoreTransaction> = tx.clone();
        bridge
            .save_record(
                &dtx,
                "MySimpleRecord",
                json!({ "rec_no": 1, "other_rec_no": 1000, "str_value": "x" }),
            )
            .await
            .unwrap();
        bridge
            .save_record(&dtx, "MyOtherRecord", json!({ "rec_no": 1000, "num_value_3": 7 }))
            .await
            .unwrap();
        assert_eq!(
            index_keys(&tx, "simple.str_value_other.num_value_3", &[])
                .await
                .len(),
            1
        );
        // Dropped without commit.
    }

    let fresh = store.begin();
    assert!(
        index_keys(&fresh, "simple.str_value_other.num_value_3", &[])
            .await
            .is_empty()
    );
    assert!(fresh
        .scan_records("MySimpleRecord", None, 10)
        .await
        .unwrap()
        .is_empty());

    // The committed path publishes both the records and the entries.
    {
        let tx = store.begin();
        let dtx: Arc<dyn StoreTransaction> = tx.clone();
        bridge
            .save_record(
                &dtx,
                "MySimpleRecord",
                json!({ "rec_no": 1, "other_rec_no": 1000, "str_value": "x" }),
            )
            .await
            .unwrap();
        bridge
            .save_record(&dtx, "MyOtherRecord", json!({ "rec_no": 1000, "num_value_3": 7 }))
            .await
            .unwrap();
        tx.commit().unwrap();
    }
    let fresh = store.begin();
    assert_eq!(
        index_keys(&fresh, "simple.str_value_other.num_value_3", &[])
            .await
            .len(),
        1
    );
}
