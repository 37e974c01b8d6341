//! Upsert engine against the in-memory warehouse

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use errors::{SyncError, UpsertStage};
use rust_decimal::Decimal;
use syncsrv::facts::{Cell, FactOrderRow, FactRow, RowSet};
use syncsrv::schema::{FACT_DELIVERY, FACT_ORDER};
use syncsrv::store::{FailPoint, MemoryTargetStore};
use syncsrv::upsert::{is_staging_name, upsert, UpsertOptions};

mod common;
use common::{date, delivery, order};

fn options() -> UpsertOptions {
    UpsertOptions {
        staging_prefix: "temp_".to_string(),
        batch_size: 2,
    }
}

fn orders(rows: Vec<FactOrderRow>) -> RowSet {
    RowSet::from_facts(rows)
}

async fn upsert_orders(store: &MemoryTargetStore, rows: Vec<FactOrderRow>) -> Result<u64, SyncError> {
    upsert(
        store,
        orders(rows),
        FactOrderRow::TABLE,
        FactOrderRow::KEY_COLUMNS,
        &options(),
    )
    .await
    .map(|o| o.merged)
}

/// Fact columns only; tracking timestamps move on every run
fn fact_snapshot(store: &MemoryTargetStore, table: &str, columns: &[&str]) -> Vec<Vec<Cell>> {
    let set = store.rows(table).unwrap();
    let idx: Vec<usize> = columns
        .iter()
        .map(|c| set.column_index(c).unwrap())
        .collect();
    let mut rows: Vec<Vec<Cell>> = set
        .rows
        .iter()
        .map(|r| idx.iter().map(|&i| r[i].clone()).collect())
        .collect();
    rows.sort_by_key(|r| format!("{:?}", r));
    rows
}

#[tokio::test]
async fn test_upsert_twice_is_idempotent() {
    let store = MemoryTargetStore::with_tables(&[FACT_ORDER]);
    let rows = vec![
        order("O1", date(2025, 1, 3), 100),
        order("O2", date(2025, 1, 4), 200),
        order("O3", date(2025, 1, 5), 300),
    ];

    upsert_orders(&store, rows.clone()).await.unwrap();
    let first = fact_snapshot(&store, "tms_fact_order", FactOrderRow::COLUMNS);

    upsert_orders(&store, rows).await.unwrap();
    let second = fact_snapshot(&store, "tms_fact_order", FactOrderRow::COLUMNS);

    assert_eq!(store.row_count("tms_fact_order"), 3);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_resync_overwrites_value_single_row() {
    let store = MemoryTargetStore::with_tables(&[FACT_ORDER]);

    upsert_orders(&store, vec![order("O1", date(2025, 1, 3), 100)])
        .await
        .unwrap();
    upsert_orders(&store, vec![order("O1", date(2025, 1, 3), 150)])
        .await
        .unwrap();

    assert_eq!(store.row_count("tms_fact_order"), 1);
    assert_eq!(
        store.lookup("tms_fact_order", "O1", "total_net_value"),
        Some(Cell::Numeric(Some(Decimal::from(150))))
    );
}

#[tokio::test]
async fn test_upsert_never_deletes_absent_keys() {
    let store = MemoryTargetStore::with_tables(&[FACT_ORDER]);
    upsert_orders(
        &store,
        vec![
            order("O1", date(2025, 1, 3), 100),
            order("O2", date(2025, 1, 4), 200),
        ],
    )
    .await
    .unwrap();

    let mut changed = order("O1", date(2025, 1, 3), 100);
    changed.status = Some("RETURNED".into());
    upsert_orders(&store, vec![changed]).await.unwrap();

    assert_eq!(store.row_count("tms_fact_order"), 2);
    assert_eq!(
        store.lookup("tms_fact_order", "O1", "status"),
        Some(Cell::text("RETURNED"))
    );
    assert_eq!(
        store.lookup("tms_fact_order", "O2", "total_net_value"),
        Some(Cell::Numeric(Some(Decimal::from(200))))
    );
}

#[tokio::test]
async fn test_composite_key_upsert() {
    let store = MemoryTargetStore::with_tables(&[FACT_DELIVERY]);
    let rows = vec![
        delivery("R1", "D1", "O1"),
        delivery("R1", "D2", "O1"),
        delivery("R2", "D1", "O1"),
    ];
    let outcome = upsert(
        &store,
        RowSet::from_facts(rows),
        "tms_fact_delivery",
        &["route_id", "route_detail_id", "order_id"],
        &options(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.merged, 3);
    assert_eq!(outcome.staged, 3);
    assert_eq!(store.row_count("tms_fact_delivery"), 3);
}

#[tokio::test]
async fn test_empty_input_touches_nothing() {
    let store = MemoryTargetStore::with_tables(&[FACT_ORDER]);
    store.inject(FailPoint::CreateStaging);

    let merged = upsert_orders(&store, Vec::new()).await.unwrap();

    assert_eq!(merged, 0);
    assert!(store.dropped_tables().is_empty());
}

#[tokio::test]
async fn test_last_synced_is_stamped() {
    let store = MemoryTargetStore::with_tables(&[FACT_ORDER]);
    upsert_orders(&store, vec![order("O1", date(2025, 1, 3), 100)])
        .await
        .unwrap();

    let stamp = store.lookup("tms_fact_order", "O1", "last_synced").unwrap();
    assert!(matches!(stamp, Cell::TimestampTz(Some(_))));
}

#[tokio::test]
async fn test_staging_dropped_after_success() {
    let store = MemoryTargetStore::with_tables(&[FACT_ORDER]);
    upsert_orders(&store, vec![order("O1", date(2025, 1, 3), 100)])
        .await
        .unwrap();

    assert!(store
        .table_names()
        .iter()
        .all(|t| !is_staging_name("temp_", t)));
}

#[tokio::test]
async fn test_staging_dropped_when_merge_fails() {
    let store = MemoryTargetStore::with_tables(&[FACT_ORDER]);
    store.inject(FailPoint::Merge);

    let err = upsert_orders(&store, vec![order("O1", date(2025, 1, 3), 100)])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SyncError::Upsert {
            stage: UpsertStage::Merge,
            ..
        }
    ));
    let dropped = store.dropped_tables();
    assert_eq!(dropped.len(), 1);
    assert!(is_staging_name("temp_", &dropped[0]));
    assert_eq!(store.row_count("tms_fact_order"), 0);
}

#[tokio::test]
async fn test_staging_dropped_when_load_fails() {
    let store = MemoryTargetStore::with_tables(&[FACT_ORDER]);
    store.inject(FailPoint::LoadStaging);

    let err = upsert_orders(&store, vec![order("O1", date(2025, 1, 3), 100)])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SyncError::Upsert {
            stage: UpsertStage::Stage,
            ..
        }
    ));
    assert_eq!(store.dropped_tables().len(), 1);
    assert_eq!(store.table_names(), vec!["tms_fact_order"]);
}

#[tokio::test]
async fn test_missing_target_table_is_upsert_error() {
    let store = MemoryTargetStore::new();
    let err = upsert_orders(&store, vec![order("O1", date(2025, 1, 3), 100)])
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Upsert { .. }));
    assert!(err.to_string().contains("tms_fact_order"));
}

#[tokio::test]
async fn test_duplicate_keys_in_one_extraction_keep_latest() {
    let store = MemoryTargetStore::with_tables(&[FACT_ORDER]);
    let outcome = upsert(
        &store,
        orders(vec![
            order("O1", date(2025, 1, 3), 100),
            order("O1", date(2025, 1, 3), 175),
        ]),
        FactOrderRow::TABLE,
        FactOrderRow::KEY_COLUMNS,
        &options(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.collapsed_duplicates, 1);
    assert_eq!(outcome.merged, 1);
    assert_eq!(
        store.lookup("tms_fact_order", "O1", "total_net_value"),
        Some(Cell::Numeric(Some(Decimal::from(175))))
    );
}
