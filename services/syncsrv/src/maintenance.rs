//! Staging table sweeps
//!
//! Failed or interrupted upserts can leave staging tables behind. The sweep
//! drops every table under the staging prefix that has the staging name
//! shape; one failing drop never stops the rest.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::store::TargetStore;
use crate::upsert::is_staging_name;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Staging tables found
    pub found: usize,
    pub dropped: usize,
    /// Names whose drop failed
    pub failed: Vec<String>,
}

/// Best-effort drop of leftover staging tables
///
/// Never fails; listing and drop errors are logged and reflected in the
/// report.
pub async fn cleanup_staging_tables(store: &dyn TargetStore, prefix: &str) -> CleanupReport {
    let mut report = CleanupReport::default();

    let tables = match store.list_tables(prefix).await {
        Ok(tables) => tables,
        Err(e) => {
            warn!("Staging sweep could not list tables: {}", e);
            return report;
        },
    };

    for table in tables.iter().filter(|t| is_staging_name(prefix, t)) {
        report.found += 1;
        match store.drop_table(table).await {
            Ok(()) => {
                report.dropped += 1;
                debug!("Dropped staging table {}", table);
            },
            Err(e) => {
                error!("Failed to drop staging table {}: {}", table, e);
                report.failed.push(table.clone());
            },
        }
    }

    if report.found > 0 {
        info!(
            "Staging sweep: dropped {}/{} tables",
            report.dropped, report.found
        );
    }
    report
}

/// Run the sweep every `interval` until the task is aborted
pub fn spawn_periodic_cleanup(
    store: Arc<dyn TargetStore>,
    prefix: String,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick fires immediately; startup already swept
        ticker.tick().await;
        loop {
            ticker.tick().await;
            cleanup_staging_tables(store.as_ref(), &prefix).await;
        }
    })
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::schema::FACT_ORDER;
    use crate::store::{FailPoint, MemoryTargetStore};
    use tracing_test::traced_test;

    #[tokio::test]
    async fn test_sweep_ignores_prefix_lookalikes() {
        let store = MemoryTargetStore::with_tables(&[FACT_ORDER]);
        store.create_bare_table("temp_tms_fact_order_20250101_120000_000001");
        store.create_bare_table("temp_notes");

        let report = cleanup_staging_tables(&store, "temp_").await;
        assert_eq!(report.found, 1);
        assert_eq!(report.dropped, 1);
        assert!(store.table_names().contains(&"temp_notes".to_string()));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_sweep_survives_list_failure() {
        let store = MemoryTargetStore::new();
        store.inject(FailPoint::ListTables);
        let report = cleanup_staging_tables(&store, "temp_").await;
        assert_eq!(report, CleanupReport::default());
        assert!(logs_contain("could not list tables"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failed_drop_is_logged() {
        let store = MemoryTargetStore::new();
        let name = "temp_tms_fact_order_20250101_120000_000001";
        store.create_bare_table(name);
        store.inject(FailPoint::Drop(name.to_string()));

        let report = cleanup_staging_tables(&store, "temp_").await;
        assert_eq!(report.failed, vec![name.to_string()]);
        assert!(logs_contain("Failed to drop staging table"));
    }
}
