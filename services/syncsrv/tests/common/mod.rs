//! Shared fixtures for the syncsrv integration tests

#![allow(dead_code)]
#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use syncsrv::config::SyncSettings;
use syncsrv::schema::ALL_TABLES;
use syncsrv::store::{MemoryFactSource, MemorySyncLog, MemoryTargetStore};
use syncsrv::{FactDeliveryRow, FactOrderRow, SyncManager};

/// Memory backends plus a manager wired to them
pub struct Harness {
    pub source: Arc<MemoryFactSource>,
    pub target: Arc<MemoryTargetStore>,
    pub log: Arc<MemorySyncLog>,
    pub manager: SyncManager,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(SyncSettings::default())
    }

    pub fn with_settings(settings: SyncSettings) -> Self {
        let source = Arc::new(MemoryFactSource::new());
        let target = Arc::new(MemoryTargetStore::with_tables(&ALL_TABLES));
        let log = Arc::new(MemorySyncLog::new());
        let manager = SyncManager::new(source.clone(), target.clone(), log.clone(), settings);
        Self {
            source,
            target,
            log,
            manager,
        }
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn order(id: &str, faktur_date: NaiveDate, net_value: i64) -> FactOrderRow {
    FactOrderRow {
        status: Some("DELIVERED".into()),
        order_id: Some(id.into()),
        route_id: Some(format!("R-{}", id)),
        faktur_date: Some(faktur_date),
        total_net_value: Some(Decimal::from(net_value)),
        ..FactOrderRow::default()
    }
}

pub fn delivery(route: &str, detail: &str, order_id: &str) -> FactDeliveryRow {
    FactDeliveryRow {
        route_id: Some(route.into()),
        route_detail_id: Some(detail.into()),
        order_id: Some(order_id.into()),
        status: Some("ON_ROUTE".into()),
        quantity_delivery: Some(Decimal::new(1250, 2)),
        ..FactDeliveryRow::default()
    }
}
