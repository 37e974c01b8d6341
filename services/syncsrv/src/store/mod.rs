//! Storage abstraction for the source, the warehouse and the sync log
//!
//! Implementations:
//! - `postgres`: production backends over `sqlx::PgPool`
//! - `memory`: in-memory backends for testing

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;
use errors::SyncResult;
use serde::{Deserialize, Serialize};

use crate::facts::{FactDeliveryRow, FactOrderRow, RowSet};
use crate::schema::TableDef;
use crate::sync_log::{SyncLogEntry, SyncStatus, SyncType};

pub use memory::{FailPoint, MemoryFactSource, MemorySyncLog, MemoryTargetStore};
pub use postgres::{PgFactSource, PgSyncLog, PgTargetStore};

/// Postgres caps bind parameters per statement at this value
pub const MAX_BIND_PARAMS: usize = 65_535;

/// Quote an identifier for interpolation into SQL
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `"schema"."table"`
pub fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Rows per INSERT statement, bounded by the bind-parameter limit
pub fn effective_batch_size(batch_size: usize, columns: usize) -> usize {
    let by_params = MAX_BIND_PARAMS / columns.max(1);
    batch_size.clamp(1, by_params.max(1))
}

/// Everything one staged merge needs to know
#[derive(Debug, Clone)]
pub struct MergePlan<'a> {
    pub staging: &'a str,
    pub target: &'a str,
    pub columns: &'a [String],
    pub key_columns: &'a [String],
    pub batch_size: usize,
}

/// Column metadata for operator inspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub max_length: Option<i32>,
    pub nullable: bool,
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintInfo {
    pub name: String,
    /// `p` primary key, `u` unique, `f` foreign key, `c` check
    pub kind: String,
    pub definition: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescription {
    pub table: String,
    pub columns: Vec<ColumnInfo>,
    pub indexes: Vec<IndexInfo>,
    pub constraints: Vec<ConstraintInfo>,
}

/// Read side: the operational database
#[async_trait]
pub trait FactSource: Send + Sync + 'static {
    /// Orders with a faktur date in `[from, to]`
    async fn fetch_orders(&self, from: NaiveDate, to: NaiveDate) -> SyncResult<Vec<FactOrderRow>>;

    /// All delivery lines
    async fn fetch_deliveries(&self) -> SyncResult<Vec<FactDeliveryRow>>;

    /// Server version string, for connection checks
    async fn server_version(&self) -> SyncResult<String>;
}

/// Write side: the warehouse database
#[async_trait]
pub trait TargetStore: Send + Sync + 'static {
    /// Create `plan.staging` shaped like the target, load `rows`, merge into
    /// the target on the key columns. Returns rows inserted or updated.
    ///
    /// Errors are `SyncError::Upsert` tagged with the failing stage.
    async fn stage_and_merge(&self, plan: &MergePlan<'_>, rows: &RowSet) -> SyncResult<u64>;

    /// `DROP TABLE IF EXISTS`
    async fn drop_table(&self, table: &str) -> SyncResult<()>;

    /// Tables in the target schema whose names start with `prefix`
    async fn list_tables(&self, prefix: &str) -> SyncResult<Vec<String>>;

    async fn table_exists(&self, table: &str) -> SyncResult<bool>;

    /// Idempotently create a table with its keys, indexes and triggers
    async fn ensure_table(&self, def: &TableDef) -> SyncResult<()>;

    /// Drop a table and everything depending on it
    async fn drop_table_cascade(&self, table: &str) -> SyncResult<()>;

    async fn describe_table(&self, table: &str) -> SyncResult<TableDescription>;

    /// Server version string, for connection checks
    async fn server_version(&self) -> SyncResult<String>;
}

/// Durable record of sync runs
#[async_trait]
pub trait SyncLogStore: Send + Sync + 'static {
    /// Open a RUNNING entry; returns its id
    async fn start(&self, sync_type: SyncType) -> SyncResult<i32>;

    /// Close a RUNNING entry. Returns false when the entry was not RUNNING.
    async fn finish(
        &self,
        id: i32,
        status: SyncStatus,
        records_processed: i32,
        error_message: Option<&str>,
    ) -> SyncResult<bool>;

    /// Newest first
    async fn recent(&self, filter: Option<SyncType>, limit: i64) -> SyncResult<Vec<SyncLogEntry>>;
}

/// Escape `%`, `_` and `\` for a LIKE pattern
pub fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 4);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("order"), "\"order\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(qualified("public", "tms_fact_order"), "\"public\".\"tms_fact_order\"");
    }

    #[test]
    fn test_effective_batch_size() {
        assert_eq!(effective_batch_size(1000, 19), 1000);
        assert_eq!(effective_batch_size(10_000, 33), 65_535 / 33);
        assert_eq!(effective_batch_size(0, 5), 1);
    }

    #[test]
    fn test_like_prefix_escapes_wildcards() {
        assert_eq!(like_prefix("temp_"), "temp\\_%");
        assert_eq!(like_prefix("a%b"), "a\\%b%");
    }
}
