//! In-memory backends for testing
//!
//! Same traits as the Postgres backends. The target store is deliberately
//! not atomic: a failed load or merge leaves the staging table in place so
//! the caller's cleanup path can be observed.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use errors::{SyncError, SyncResult, UpsertStage};
use parking_lot::Mutex;

use super::{
    ColumnInfo, ConstraintInfo, FactSource, IndexInfo, MergePlan, SyncLogStore, TableDescription,
    TargetStore,
};
use crate::facts::{Cell, FactDeliveryRow, FactOrderRow, FactRow, RowSet};
use crate::schema::TableDef;
use crate::sync_log::{SyncLogEntry, SyncStatus, SyncType};

// ============================================================================
// Source
// ============================================================================

/// Fact rows held in memory, filtered like the source queries
#[derive(Default)]
pub struct MemoryFactSource {
    orders: Mutex<Vec<FactOrderRow>>,
    deliveries: Mutex<Vec<FactDeliveryRow>>,
    order_failure: Mutex<Option<String>>,
    delivery_failure: Mutex<Option<String>>,
    order_ranges: Mutex<Vec<(NaiveDate, NaiveDate)>>,
}

impl MemoryFactSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_orders(&self, rows: Vec<FactOrderRow>) {
        *self.orders.lock() = rows;
    }

    pub fn set_deliveries(&self, rows: Vec<FactDeliveryRow>) {
        *self.deliveries.lock() = rows;
    }

    /// Make `fetch_orders` fail with `message`
    pub fn fail_orders(&self, message: impl Into<String>) {
        *self.order_failure.lock() = Some(message.into());
    }

    /// Make `fetch_deliveries` fail with `message`
    pub fn fail_deliveries(&self, message: impl Into<String>) {
        *self.delivery_failure.lock() = Some(message.into());
    }

    /// Date windows passed to `fetch_orders`, oldest first
    pub fn order_ranges(&self) -> Vec<(NaiveDate, NaiveDate)> {
        self.order_ranges.lock().clone()
    }
}

#[async_trait]
impl FactSource for MemoryFactSource {
    async fn fetch_orders(&self, from: NaiveDate, to: NaiveDate) -> SyncResult<Vec<FactOrderRow>> {
        self.order_ranges.lock().push((from, to));
        if let Some(message) = self.order_failure.lock().clone() {
            return Err(SyncError::query(FactOrderRow::DATASET, message));
        }

        let mut rows: Vec<FactOrderRow> = self
            .orders
            .lock()
            .iter()
            .filter(|r| matches!(r.faktur_date, Some(d) if d >= from && d <= to))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.faktur_date.cmp(&a.faktur_date));
        Ok(rows)
    }

    async fn fetch_deliveries(&self) -> SyncResult<Vec<FactDeliveryRow>> {
        if let Some(message) = self.delivery_failure.lock().clone() {
            return Err(SyncError::query(FactDeliveryRow::DATASET, message));
        }
        Ok(self.deliveries.lock().clone())
    }

    async fn server_version(&self) -> SyncResult<String> {
        Ok("memory".to_string())
    }
}

// ============================================================================
// Target
// ============================================================================

/// Injected target failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailPoint {
    CreateStaging,
    LoadStaging,
    Merge,
    /// `drop_table` on this table name
    Drop(String),
    ListTables,
}

#[derive(Debug, Clone)]
struct MemTable {
    columns: Vec<String>,
    key_columns: Vec<String>,
    /// Value used for columns a merge does not supply
    defaults: Vec<Cell>,
    rows: Vec<Vec<Cell>>,
    def: Option<TableDef>,
}

impl MemTable {
    fn bare(columns: Vec<String>) -> Self {
        let defaults = vec![Cell::Text(None); columns.len()];
        Self {
            columns,
            key_columns: Vec::new(),
            defaults,
            rows: Vec::new(),
            def: None,
        }
    }

    fn from_def(def: &TableDef) -> Self {
        let now = Utc::now();
        Self {
            columns: def.columns.iter().map(|c| c.name.to_string()).collect(),
            key_columns: def.primary_key.iter().map(|k| k.to_string()).collect(),
            defaults: def
                .columns
                .iter()
                .map(|c| match c.modifier {
                    Some(m) if m.contains("CURRENT_TIMESTAMP") => Cell::TimestampTz(Some(now)),
                    _ => Cell::Text(None),
                })
                .collect(),
            rows: Vec::new(),
            def: Some(*def),
        }
    }

    fn index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }
}

#[derive(Default)]
struct TargetState {
    tables: BTreeMap<String, MemTable>,
    fail_points: Vec<FailPoint>,
    dropped: Vec<String>,
}

impl TargetState {
    fn fails(&self, point: &FailPoint) -> bool {
        self.fail_points.contains(point)
    }
}

/// Warehouse tables held in memory
#[derive(Default)]
pub struct MemoryTargetStore {
    state: Mutex<TargetState>,
}

impl MemoryTargetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with the given table definitions already created
    pub fn with_tables(defs: &[TableDef]) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.lock();
            for def in defs {
                state.tables.insert(def.name.to_string(), MemTable::from_def(def));
            }
        }
        store
    }

    pub fn inject(&self, point: FailPoint) {
        self.state.lock().fail_points.push(point);
    }

    pub fn clear_fail_points(&self) {
        self.state.lock().fail_points.clear();
    }

    /// A table with one text column, e.g. an orphaned staging table
    pub fn create_bare_table(&self, name: &str) {
        self.state
            .lock()
            .tables
            .insert(name.to_string(), MemTable::bare(vec!["id".to_string()]));
    }

    pub fn table_names(&self) -> Vec<String> {
        self.state.lock().tables.keys().cloned().collect()
    }

    /// Tables removed by `drop_table` or `drop_table_cascade`, in order
    pub fn dropped_tables(&self) -> Vec<String> {
        self.state.lock().dropped.clone()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.state
            .lock()
            .tables
            .get(table)
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }

    /// Snapshot of a table's rows
    pub fn rows(&self, table: &str) -> Option<RowSet> {
        self.state.lock().tables.get(table).map(|t| RowSet {
            columns: t.columns.clone(),
            rows: t.rows.clone(),
        })
    }

    /// Value of `column` in the row whose first key column equals `key`
    pub fn lookup(&self, table: &str, key: &str, column: &str) -> Option<Cell> {
        let state = self.state.lock();
        let t = state.tables.get(table)?;
        let key_idx = t.index(t.key_columns.first()?)?;
        let col_idx = t.index(column)?;
        t.rows
            .iter()
            .find(|row| row[key_idx] == Cell::text(key))
            .map(|row| row[col_idx].clone())
    }
}

fn merge_rows(target: &mut MemTable, staging: &MemTable, plan: &MergePlan<'_>) -> Result<u64, String> {
    let mapping: Vec<usize> = plan
        .columns
        .iter()
        .map(|c| {
            target
                .index(c)
                .ok_or_else(|| format!("column \"{}\" of relation does not exist", c))
        })
        .collect::<Result<_, _>>()?;
    let key_positions: Vec<usize> = plan
        .key_columns
        .iter()
        .map(|k| {
            plan.columns
                .iter()
                .position(|c| c == k)
                .ok_or_else(|| format!("key column \"{}\" missing from staging", k))
        })
        .collect::<Result<_, _>>()?;
    let target_keys: Vec<usize> = plan
        .key_columns
        .iter()
        .map(|k| target.index(k).ok_or_else(|| format!("no key column \"{}\"", k)))
        .collect::<Result<_, _>>()?;
    let updated_at = target.index("updated_at");

    let mut seen: HashSet<Vec<Cell>> = HashSet::new();
    for row in &staging.rows {
        let key: Vec<Cell> = key_positions.iter().map(|&i| row[i].clone()).collect();
        if !seen.insert(key) {
            return Err(
                "ON CONFLICT DO UPDATE command cannot affect row a second time".to_string(),
            );
        }
    }

    let now = Cell::TimestampTz(Some(Utc::now()));
    let mut merged = 0;
    for row in &staging.rows {
        let existing = target.rows.iter().position(|stored| {
            target_keys
                .iter()
                .zip(&key_positions)
                .all(|(&t, &s)| stored[t] == row[s])
        });

        match existing {
            Some(at) => {
                for (s, &t) in mapping.iter().enumerate() {
                    if !target_keys.contains(&t) {
                        target.rows[at][t] = row[s].clone();
                    }
                }
                if let Some(u) = updated_at {
                    target.rows[at][u] = now.clone();
                }
            },
            None => {
                let mut stored = target.defaults.clone();
                for (s, &t) in mapping.iter().enumerate() {
                    stored[t] = row[s].clone();
                }
                target.rows.push(stored);
            },
        }
        merged += 1;
    }

    Ok(merged)
}

#[async_trait]
impl TargetStore for MemoryTargetStore {
    async fn stage_and_merge(&self, plan: &MergePlan<'_>, rows: &RowSet) -> SyncResult<u64> {
        let mut state = self.state.lock();
        let fail = |stage: UpsertStage, message: &str| {
            SyncError::upsert(plan.target, stage, message.to_string())
        };

        if state.fails(&FailPoint::CreateStaging) {
            return Err(fail(UpsertStage::Stage, "injected create failure"));
        }
        if !state.tables.contains_key(plan.target) {
            return Err(fail(
                UpsertStage::Stage,
                &format!("relation \"{}\" does not exist", plan.target),
            ));
        }

        state.tables.insert(
            plan.staging.to_string(),
            MemTable::bare(plan.columns.to_vec()),
        );

        if state.fails(&FailPoint::LoadStaging) {
            return Err(fail(UpsertStage::Stage, "injected load failure"));
        }
        if let Some(staging) = state.tables.get_mut(plan.staging) {
            staging.rows = rows.rows.clone();
        }

        if state.fails(&FailPoint::Merge) {
            return Err(fail(UpsertStage::Merge, "injected merge failure"));
        }

        let staging = state
            .tables
            .remove(plan.staging)
            .ok_or_else(|| fail(UpsertStage::Merge, "staging table vanished"))?;
        let target = state
            .tables
            .get_mut(plan.target)
            .ok_or_else(|| fail(UpsertStage::Merge, "target table vanished"))?;

        match merge_rows(target, &staging, plan) {
            Ok(merged) => Ok(merged),
            Err(message) => {
                // Put staging back so the caller's drop finds it
                state.tables.insert(plan.staging.to_string(), staging);
                Err(fail(UpsertStage::Merge, &message))
            },
        }
    }

    async fn drop_table(&self, table: &str) -> SyncResult<()> {
        let mut state = self.state.lock();
        if state.fails(&FailPoint::Drop(table.to_string())) {
            return Err(SyncError::Internal(format!(
                "injected drop failure for {}",
                table
            )));
        }
        if state.tables.remove(table).is_some() {
            state.dropped.push(table.to_string());
        }
        Ok(())
    }

    async fn list_tables(&self, prefix: &str) -> SyncResult<Vec<String>> {
        let state = self.state.lock();
        if state.fails(&FailPoint::ListTables) {
            return Err(SyncError::Internal("injected list failure".to_string()));
        }
        Ok(state
            .tables
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn table_exists(&self, table: &str) -> SyncResult<bool> {
        Ok(self.state.lock().tables.contains_key(table))
    }

    async fn ensure_table(&self, def: &TableDef) -> SyncResult<()> {
        self.state
            .lock()
            .tables
            .entry(def.name.to_string())
            .or_insert_with(|| MemTable::from_def(def));
        Ok(())
    }

    async fn drop_table_cascade(&self, table: &str) -> SyncResult<()> {
        let mut state = self.state.lock();
        if state.tables.remove(table).is_some() {
            state.dropped.push(table.to_string());
        }
        Ok(())
    }

    async fn describe_table(&self, table: &str) -> SyncResult<TableDescription> {
        let state = self.state.lock();
        let mem = state.tables.get(table).ok_or_else(|| SyncError::NotFound {
            resource: format!("table {}", table),
        })?;

        let Some(def) = mem.def else {
            return Ok(TableDescription {
                table: table.to_string(),
                columns: mem
                    .columns
                    .iter()
                    .map(|name| ColumnInfo {
                        name: name.clone(),
                        data_type: "text".to_string(),
                        max_length: None,
                        nullable: true,
                        default: None,
                    })
                    .collect(),
                ..TableDescription::default()
            });
        };

        let pk_name = format!("{}_pkey", def.name);
        Ok(TableDescription {
            table: table.to_string(),
            columns: def
                .columns
                .iter()
                .map(|c| ColumnInfo {
                    name: c.name.to_string(),
                    data_type: c.sql_type.to_ascii_lowercase(),
                    max_length: None,
                    nullable: !def.primary_key.contains(&c.name)
                        && c.modifier != Some("NOT NULL"),
                    default: c
                        .modifier
                        .and_then(|m| m.strip_prefix("DEFAULT "))
                        .map(str::to_string),
                })
                .collect(),
            indexes: def
                .indexes
                .iter()
                .map(|column| IndexInfo {
                    name: format!("idx_{}_{}", def.name, column),
                    definition: format!("btree ({})", column),
                })
                .collect(),
            constraints: vec![ConstraintInfo {
                name: pk_name,
                kind: "p".to_string(),
                definition: format!("PRIMARY KEY ({})", def.primary_key.join(", ")),
            }],
        })
    }

    async fn server_version(&self) -> SyncResult<String> {
        Ok("memory".to_string())
    }
}

// ============================================================================
// Sync log
// ============================================================================

#[derive(Default)]
struct LogState {
    entries: Vec<SyncLogEntry>,
    next_id: i32,
    unavailable: bool,
    finish_fails: bool,
}

/// Sync log held in memory
#[derive(Default)]
pub struct MemorySyncLog {
    state: Mutex<LogState>,
}

impl MemorySyncLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry, oldest first
    pub fn entries(&self) -> Vec<SyncLogEntry> {
        self.state.lock().entries.clone()
    }

    /// Seed a historical entry; its id is reassigned
    pub fn insert(&self, mut entry: SyncLogEntry) -> i32 {
        let mut state = self.state.lock();
        state.next_id += 1;
        entry.id = state.next_id;
        state.entries.push(entry);
        state.next_id
    }

    /// Make every call fail as if the log table were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    /// Fail only `finish`, leaving entries RUNNING
    pub fn fail_finish(&self, fail: bool) {
        self.state.lock().finish_fails = fail;
    }

    fn check(state: &LogState) -> SyncResult<()> {
        if state.unavailable {
            return Err(SyncError::Internal("sync log unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SyncLogStore for MemorySyncLog {
    async fn start(&self, sync_type: SyncType) -> SyncResult<i32> {
        let mut state = self.state.lock();
        Self::check(&state)?;
        state.next_id += 1;
        let id = state.next_id;
        state.entries.push(SyncLogEntry {
            id,
            sync_type: sync_type.as_str().to_string(),
            start_time: Utc::now(),
            end_time: None,
            status: SyncStatus::Running,
            records_processed: 0,
            error_message: None,
        });
        Ok(id)
    }

    async fn finish(
        &self,
        id: i32,
        status: SyncStatus,
        records_processed: i32,
        error_message: Option<&str>,
    ) -> SyncResult<bool> {
        let mut state = self.state.lock();
        Self::check(&state)?;
        if state.finish_fails {
            return Err(SyncError::Internal("sync log update rejected".to_string()));
        }
        let Some(entry) = state
            .entries
            .iter_mut()
            .find(|e| e.id == id && e.status == SyncStatus::Running)
        else {
            return Ok(false);
        };

        // Clock resolution can make both stamps equal on fast runs
        entry.end_time = Some(Utc::now().max(entry.start_time + Duration::microseconds(1)));
        entry.status = status;
        entry.records_processed = records_processed;
        entry.error_message = error_message.map(str::to_string);
        Ok(true)
    }

    async fn recent(&self, filter: Option<SyncType>, limit: i64) -> SyncResult<Vec<SyncLogEntry>> {
        let state = self.state.lock();
        Self::check(&state)?;
        let mut entries: Vec<SyncLogEntry> = state
            .entries
            .iter()
            .filter(|e| filter.map_or(true, |t| e.sync_type == t.as_str()))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.id.cmp(&a.id)));
        entries.truncate(limit.max(0) as usize);
        Ok(entries)
    }
}
