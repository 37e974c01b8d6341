//! Warehouse table definitions and idempotent bootstrap
//!
//! Every managed table carries `created_at`/`updated_at` tracking columns and
//! a BEFORE UPDATE trigger that refreshes `updated_at`. Fact tables also carry
//! `last_synced`, stamped by each upsert.

use std::str::FromStr;

use errors::{SyncError, SyncResult};
use serde::Serialize;
use tracing::{info, warn};

use crate::facts::{FactDeliveryRow, FactOrderRow, FactRow};
use crate::store::{qualified, quote_ident, TargetStore};

/// Column stamped with the upsert time
pub const LAST_SYNCED: &str = "last_synced";

/// Sync log table name
pub const SYNC_LOG_TABLE: &str = "sync_log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub sql_type: &'static str,
    /// Trailing column clause such as `NOT NULL` or a default
    pub modifier: Option<&'static str>,
}

const fn col(name: &'static str, sql_type: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        sql_type,
        modifier: None,
    }
}

const fn col_with(name: &'static str, sql_type: &'static str, modifier: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        sql_type,
        modifier: Some(modifier),
    }
}

const TRACKED_AT: &str = "TIMESTAMP WITH TIME ZONE";
const NOW_DEFAULT: &str = "DEFAULT CURRENT_TIMESTAMP";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
    pub primary_key: &'static [&'static str],
    /// Single-column secondary indexes
    pub indexes: &'static [&'static str],
}

impl TableDef {
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    fn index_name(&self, column: &str) -> String {
        format!("idx_{}_{}", self.name, column)
    }

    fn trigger_function(&self) -> String {
        format!("update_{}_updated_at", self.name)
    }

    fn trigger_name(&self) -> String {
        format!("trigger_{}_updated_at", self.name)
    }
}

pub const FACT_ORDER: TableDef = TableDef {
    name: FactOrderRow::TABLE,
    columns: &[
        col("status", "VARCHAR(50)"),
        col("manifest_reference", "VARCHAR(100)"),
        col("order_id", "VARCHAR(50)"),
        col("manifest_integration_id", "VARCHAR(100)"),
        col("external_expedition_type", "VARCHAR(50)"),
        col("driver_name", "VARCHAR(100)"),
        col("code", "VARCHAR(50)"),
        col("faktur_date", "DATE"),
        col("tms_created", "TIMESTAMP"),
        col("route_created", "DATE"),
        col("delivery_date", "DATE"),
        col("route_id", "VARCHAR(50)"),
        col("tms_complete", "TIMESTAMP"),
        col("location_confirmation", "DATE"),
        col("faktur_total_quantity", "NUMERIC(15,2)"),
        col("tms_total_quantity", "NUMERIC(15,2)"),
        col("total_return", "NUMERIC(15,2)"),
        col("total_net_value", "NUMERIC(15,2)"),
        col_with(LAST_SYNCED, TRACKED_AT, NOW_DEFAULT),
        col_with("created_at", TRACKED_AT, NOW_DEFAULT),
        col_with("updated_at", TRACKED_AT, NOW_DEFAULT),
    ],
    primary_key: FactOrderRow::KEY_COLUMNS,
    indexes: &["faktur_date", "route_id", LAST_SYNCED],
};

pub const FACT_DELIVERY: TableDef = TableDef {
    name: FactDeliveryRow::TABLE,
    columns: &[
        col("route_id", "VARCHAR(50)"),
        col("manifest_reference", "VARCHAR(100)"),
        col("route_detail_id", "VARCHAR(50)"),
        col("order_id", "VARCHAR(50)"),
        col("do_number", "VARCHAR(100)"),
        col("faktur_date", "DATE"),
        col("created_date_only", "DATE"),
        col("waktu", "TIME"),
        col("delivery_date", "DATE"),
        col("status", "VARCHAR(50)"),
        col("client_id", "VARCHAR(50)"),
        col("warehouse_id", "VARCHAR(50)"),
        col("origin_name", "VARCHAR(200)"),
        col("origin_city", "VARCHAR(100)"),
        col("customer_id", "VARCHAR(50)"),
        col("code", "VARCHAR(50)"),
        col("name", "VARCHAR(200)"),
        col("address", "TEXT"),
        col("address_text", "TEXT"),
        col("external_expedition_type", "VARCHAR(50)"),
        col("vehicle_id", "VARCHAR(50)"),
        col("driver_id", "VARCHAR(50)"),
        col("plate_number", "VARCHAR(20)"),
        col("driver_name", "VARCHAR(100)"),
        col("kenek_id", "VARCHAR(50)"),
        col("kenek_name", "VARCHAR(100)"),
        col("driver_status", "VARCHAR(50)"),
        col("manifest_integration_id", "VARCHAR(100)"),
        col("complete_time", "TIMESTAMP"),
        col("net_price", "NUMERIC(15,2)"),
        col("quantity_delivery", "NUMERIC(15,2)"),
        col("quantity_faktur", "NUMERIC(15,2)"),
        col_with(LAST_SYNCED, TRACKED_AT, NOW_DEFAULT),
        col_with("created_at", TRACKED_AT, NOW_DEFAULT),
        col_with("updated_at", TRACKED_AT, NOW_DEFAULT),
    ],
    primary_key: FactDeliveryRow::KEY_COLUMNS,
    indexes: &[
        "route_id",
        "order_id",
        "faktur_date",
        "delivery_date",
        LAST_SYNCED,
        "driver_id",
        "vehicle_id",
    ],
};

pub const SYNC_LOG: TableDef = TableDef {
    name: SYNC_LOG_TABLE,
    columns: &[
        col("id", "SERIAL"),
        col_with("sync_type", "VARCHAR(50)", "NOT NULL"),
        col_with("start_time", TRACKED_AT, NOW_DEFAULT),
        col("end_time", TRACKED_AT),
        col_with("status", "VARCHAR(20)", "NOT NULL"),
        col_with("records_processed", "INTEGER", "DEFAULT 0"),
        col("error_message", "TEXT"),
        col_with("created_at", TRACKED_AT, NOW_DEFAULT),
        col_with("updated_at", TRACKED_AT, NOW_DEFAULT),
    ],
    primary_key: &["id"],
    indexes: &["sync_type", "start_time", "status"],
};

/// Managed tables in creation order
pub const ALL_TABLES: [TableDef; 3] = [FACT_ORDER, FACT_DELIVERY, SYNC_LOG];

/// Render idempotent DDL for `def` in `schema`
pub fn render_ddl(schema: &str, def: &TableDef) -> String {
    let table = qualified(schema, def.name);

    let mut lines: Vec<String> = def
        .columns
        .iter()
        .map(|c| match c.modifier {
            Some(m) => format!("    {} {} {}", quote_ident(c.name), c.sql_type, m),
            None => format!("    {} {}", quote_ident(c.name), c.sql_type),
        })
        .collect();
    let pk: Vec<String> = def.primary_key.iter().map(|k| quote_ident(k)).collect();
    lines.push(format!("    PRIMARY KEY ({})", pk.join(", ")));

    let mut ddl = format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n);\n",
        table,
        lines.join(",\n")
    );

    for column in def.indexes {
        ddl.push_str(&format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({});\n",
            quote_ident(&def.index_name(column)),
            table,
            quote_ident(column)
        ));
    }

    let function = qualified(schema, &def.trigger_function());
    let trigger = quote_ident(&def.trigger_name());
    ddl.push_str(&format!(
        r#"CREATE OR REPLACE FUNCTION {function}()
RETURNS TRIGGER AS $$
BEGIN
    NEW.updated_at = CURRENT_TIMESTAMP;
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;
DROP TRIGGER IF EXISTS {trigger} ON {table};
CREATE TRIGGER {trigger}
    BEFORE UPDATE ON {table}
    FOR EACH ROW
    EXECUTE FUNCTION {function}();
"#
    ));

    ddl
}

/// Which tables a bootstrap touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableSelection {
    FactOrder,
    FactDelivery,
    SyncLog,
    All,
}

impl TableSelection {
    pub fn tables(&self) -> Vec<TableDef> {
        match self {
            Self::FactOrder => vec![FACT_ORDER],
            Self::FactDelivery => vec![FACT_DELIVERY],
            Self::SyncLog => vec![SYNC_LOG],
            Self::All => ALL_TABLES.to_vec(),
        }
    }
}

impl FromStr for TableSelection {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fact_order" | "tms_fact_order" => Ok(Self::FactOrder),
            "fact_delivery" | "tms_fact_delivery" => Ok(Self::FactDelivery),
            "sync_log" => Ok(Self::SyncLog),
            "all" => Ok(Self::All),
            other => Err(SyncError::Validation(format!(
                "unknown table '{}', expected fact_order, fact_delivery, sync_log or all",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableAction {
    Created,
    AlreadyPresent,
    Recreated,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BootstrapReport {
    pub tables: Vec<(String, TableAction)>,
}

impl BootstrapReport {
    pub fn action_for(&self, table: &str) -> Option<TableAction> {
        self.tables
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, action)| *action)
    }
}

/// Ensure the selected tables exist
///
/// With `force`, existing tables are dropped with CASCADE first and all of
/// their rows are lost.
pub async fn bootstrap(
    store: &dyn TargetStore,
    selection: TableSelection,
    force: bool,
) -> SyncResult<BootstrapReport> {
    let mut report = BootstrapReport::default();

    for def in selection.tables() {
        let existed = store.table_exists(def.name).await?;

        let action = if existed && force {
            warn!("Force mode: dropping {} and recreating it", def.name);
            store.drop_table_cascade(def.name).await?;
            TableAction::Recreated
        } else if existed {
            TableAction::AlreadyPresent
        } else {
            TableAction::Created
        };

        // Re-run on existing tables too so indexes and triggers converge
        store.ensure_table(&def).await?;

        info!("Table {}: {:?}", def.name, action);
        report.tables.push((def.name.to_string(), action));
    }

    Ok(report)
}
