//! Staging sweep and schema bootstrap against the in-memory warehouse

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use syncsrv::maintenance::cleanup_staging_tables;
use syncsrv::schema::{bootstrap, TableAction, TableSelection, FACT_ORDER};
use syncsrv::store::{FailPoint, MemoryTargetStore, TargetStore};

const STAGING: [&str; 4] = [
    "temp_tms_fact_order_20250101_120000_000001",
    "temp_tms_fact_order_20250101_120000_000002",
    "temp_tms_fact_delivery_20250102_080000_123456",
    "temp_tms_fact_delivery_20250103_235959_999999",
];

const OTHERS: [&str; 3] = ["tms_fact_order", "temp_notes", "customer_snapshot"];

fn seeded() -> MemoryTargetStore {
    let store = MemoryTargetStore::new();
    for name in STAGING.iter().chain(OTHERS.iter()) {
        store.create_bare_table(name);
    }
    store
}

#[tokio::test]
async fn test_sweep_drops_exactly_the_staging_tables() {
    let store = seeded();

    let report = cleanup_staging_tables(&store, "temp_").await;

    assert_eq!(report.found, STAGING.len());
    assert_eq!(report.dropped, STAGING.len());
    assert!(report.failed.is_empty());
    let mut remaining = store.table_names();
    remaining.sort();
    let mut expected: Vec<String> = OTHERS.iter().map(|s| s.to_string()).collect();
    expected.sort();
    assert_eq!(remaining, expected);
}

#[tokio::test]
async fn test_sweep_continues_past_failed_drop() {
    let store = seeded();
    store.inject(FailPoint::Drop(STAGING[1].to_string()));

    let report = cleanup_staging_tables(&store, "temp_").await;

    assert_eq!(report.found, STAGING.len());
    assert_eq!(report.dropped, STAGING.len() - 1);
    assert_eq!(report.failed, vec![STAGING[1].to_string()]);
    assert_eq!(store.dropped_tables().len(), STAGING.len() - 1);
    for other in OTHERS {
        assert!(store.table_names().contains(&other.to_string()));
    }

    // Next sweep picks up the survivor
    store.clear_fail_points();
    let report = cleanup_staging_tables(&store, "temp_").await;
    assert_eq!(report.found, 1);
    assert_eq!(report.dropped, 1);
}

#[tokio::test]
async fn test_bootstrap_creates_then_reports_present() {
    let store = MemoryTargetStore::new();

    let report = bootstrap(&store, TableSelection::All, false).await.unwrap();
    assert_eq!(report.tables.len(), 3);
    assert_eq!(report.action_for("tms_fact_order"), Some(TableAction::Created));
    assert_eq!(report.action_for("sync_log"), Some(TableAction::Created));

    let again = bootstrap(&store, TableSelection::All, false).await.unwrap();
    assert!(again
        .tables
        .iter()
        .all(|(_, action)| *action == TableAction::AlreadyPresent));
}

#[tokio::test]
async fn test_force_bootstrap_recreates_selected_table_only() {
    let store = MemoryTargetStore::new();
    bootstrap(&store, TableSelection::All, false).await.unwrap();

    let report = bootstrap(&store, TableSelection::FactOrder, true)
        .await
        .unwrap();

    assert_eq!(report.tables.len(), 1);
    assert_eq!(report.action_for("tms_fact_order"), Some(TableAction::Recreated));
    assert_eq!(store.dropped_tables(), vec!["tms_fact_order"]);
    assert!(store.table_exists("tms_fact_delivery").await.unwrap());
    assert!(store.table_exists("tms_fact_order").await.unwrap());
}

#[tokio::test]
async fn test_describe_lists_columns_and_key() {
    let store = MemoryTargetStore::with_tables(&[FACT_ORDER]);

    let description = store.describe_table("tms_fact_order").await.unwrap();

    assert_eq!(description.columns.len(), FACT_ORDER.columns.len());
    let order_id = description
        .columns
        .iter()
        .find(|c| c.name == "order_id")
        .unwrap();
    assert!(!order_id.nullable);
    assert_eq!(description.constraints[0].kind, "p");
    assert!(store.describe_table("missing").await.is_err());
}
