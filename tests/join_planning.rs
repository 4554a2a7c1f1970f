//! Join Planning Tests
//!
//! Planner invariants:
//! - Deterministic: same schema -> same plan, same structural hash
//! - Synchronous rejection before any store access
//! - Continuations bind to plan shape through the hash

use std::sync::Arc;

use serde_json::json;
use synthdb::executor::{ExecuteLimits, ExecutorErrorCode};
use synthdb::planner::{PlannerErrorCode, SyntheticRecordPlanner};
use synthdb::schema::{JoinedTypeBuilder, KeyExpression, Schema, SchemaBuilder, SchemaErrorCode};
use synthdb::store::memory::MemoryStore;
use synthdb::store::{StoreTransaction, StoredRecord};
use synthdb::tuple::TupleValue;

// =============================================================================
// Helper Functions
// =============================================================================

fn joined_schema() -> Arc<Schema> {
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
        .build()
        .unwrap()
}

// =============================================================================
// Schema Validation (build time, before any planning)
// =============================================================================

#[test]
fn test_invalid_joined_types_rejected_at_build() {
    let base = || {
        SchemaBuilder::new()
            .record_type("A", KeyExpression::field("id"))
            .record_type("B", KeyExpression::field("id"))
            .record_type("C", KeyExpression::field("id"))
    };

    let unknown = base()
        .joined_type(
            JoinedTypeBuilder::new("J")
                .constituent("a", "A")
                .constituent("b", "B")
                .join("a", "b_id", "ghost", "id"),
        )
        .build()
        .unwrap_err();
    assert_eq!(unknown.code(), SchemaErrorCode::UnknownConstituent);

    let arity = base()
        .joined_type(
            JoinedTypeBuilder::new("J")
                .constituent("a", "A")
                .constituent("b", "B")
                .join_expr(
                    "a",
                    KeyExpression::concat([KeyExpression::field("x"), KeyExpression::field("y")]),
                    "b",
                    KeyExpression::field("x"),
                ),
        )
        .build()
        .unwrap_err();
    assert_eq!(arity.code(), SchemaErrorCode::KeyArityMismatch);

    let disconnected = base()
        .joined_type(
            JoinedTypeBuilder::new("J")
                .constituent("a", "A")
                .constituent("b", "B")
                .constituent("c", "C")
                .join("a", "b_id", "b", "id"),
        )
        .build()
        .unwrap_err();
    assert_eq!(disconnected.code(), SchemaErrorCode::Disconnected);
}

// =============================================================================
// Plan Determinism
// =============================================================================

#[test]
fn test_plan_hash_stable_across_planner_instances() {
    let schema = joined_schema();
    let h1 = SyntheticRecordPlanner::new(Arc::clone(&schema))
        .scan_for_type("Simple_Other")
        .unwrap()
        .plan_hash();
    let h2 = SyntheticRecordPlanner::new(Arc::clone(&schema))
        .scan_for_type("Simple_Other")
        .unwrap()
        .plan_hash();
    assert_eq!(h1, h2);

    let reverse = SyntheticRecordPlanner::new(schema)
        .from_stored_type("MySimpleRecord", false)
        .unwrap()
        .plan_hash();
    assert_ne!(h1, reverse);
}

#[test]
fn test_explain_is_deterministic() {
    let schema = joined_schema();
    let planner = SyntheticRecordPlanner::new(schema);
    let a = planner.scan_for_type("Simple_Other").unwrap().explain();
    let b = planner.scan_for_type("Simple_Other").unwrap().explain();
    assert_eq!(a, b);
    assert!(a.contains("SCAN simple"));
    assert!(a.contains("JOIN other"));
    assert!(a.contains("PK_LOOKUP"));
}

// =============================================================================
// Synchronous Planning Errors
// =============================================================================

#[test]
fn test_planning_errors_reported_before_execution() {
    let schema = joined_schema();
    let planner = SyntheticRecordPlanner::new(schema);

    let unknown = planner.scan_for_type("Ghost").unwrap_err();
    assert_eq!(unknown.code(), PlannerErrorCode::UnknownType);

    let unknown_stored = planner.from_stored_type("GhostRecord", true).unwrap_err();
    assert_eq!(unknown_stored.code(), PlannerErrorCode::UnknownRecordType);

    // No reverse index from "other" to "simple" in this schema.
    let schema = SchemaBuilder::new()
        .record_type("MySimpleRecord", KeyExpression::field("rec_no"))
        .record_type("MyOtherRecord", KeyExpression::field("rec_no"))
        .joined_type(
            JoinedTypeBuilder::new("NoIndex")
                .constituent("simple", "MySimpleRecord")
                .constituent("other", "MyOtherRecord")
                .join("simple", "other_rec_no", "other", "rec_no"),
        )
        .build()
        .unwrap();
    let planner = SyntheticRecordPlanner::new(schema);
    let err = planner.from_stored_type("MyOtherRecord", true).unwrap_err();
    assert_eq!(err.code(), PlannerErrorCode::NoUsableIndex);
}

// =============================================================================
// Plan Surface
// =============================================================================

/// A from-record plan refuses a record of the wrong stored type.
#[tokio::test]
async fn test_seed_type_checked_at_execute() {
    let schema = joined_schema();
    let store = MemoryStore::new(Arc::clone(&schema));
    let tx = store.begin();
    let dtx: Arc<dyn StoreTransaction> = tx;
    let planner = SyntheticRecordPlanner::new(schema);

    let plan = planner.from_stored_type("MySimpleRecord", false).unwrap();
    let wrong = StoredRecord::new(
        "MyOtherRecord",
        TupleValue::key1(TupleValue::Int(1)),
        json!({ "rec_no": 1 }),
    );
    let err = plan
        .execute(dtx, &wrong, None, ExecuteLimits::default())
        .unwrap_err();
    assert_eq!(err.code(), ExecutorErrorCode::SeedMismatch);
}

/// Plans are store-independent: the same plan executes against different
/// transactions.
#[tokio::test]
async fn test_plan_reuse_across_transactions() {
    let schema = joined_schema();
    let planner = SyntheticRecordPlanner::new(Arc::clone(&schema));
    let plan = planner.scan_for_type("Simple_Other").unwrap();

    let store = MemoryStore::new(schema);
    let tx1 = store.begin();
    tx1.put_record(StoredRecord::new(
        "MySimpleRecord",
        TupleValue::key1(TupleValue::Int(0)),
        json!({ "rec_no": 0, "other_rec_no": 1000 }),
    ))
    .await
    .unwrap();
    tx1.put_record(StoredRecord::new(
        "MyOtherRecord",
        TupleValue::key1(TupleValue::Int(1000)),
        json!({ "rec_no": 1000 }),
    ))
    .await
    .unwrap();
    tx1.commit().unwrap();

    let dtx1: Arc<dyn StoreTransaction> = store.begin();
    let mut cursor = plan
        .execute(Arc::clone(&dtx1), None, ExecuteLimits::default())
        .unwrap();
    assert_eq!(cursor.collect().await.unwrap().len(), 1);

    // An empty store through the same plan.
    let empty = MemoryStore::new(joined_schema());
    let dtx2: Arc<dyn StoreTransaction> = empty.begin();
    let mut cursor = plan
        .execute(dtx2, None, ExecuteLimits::default())
        .unwrap();
    assert!(cursor.collect().await.unwrap().is_empty());
}
