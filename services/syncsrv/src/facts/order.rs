//! `fact_order`: one row per order with delivery quantity totals

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use sqlx::FromRow;

use super::{Cell, FactRow};
use crate::store::quote_ident;

#[derive(Debug, Clone, Default, PartialEq, FromRow)]
pub struct FactOrderRow {
    pub status: Option<String>,
    pub manifest_reference: Option<String>,
    pub order_id: Option<String>,
    pub manifest_integration_id: Option<String>,
    pub external_expedition_type: Option<String>,
    pub driver_name: Option<String>,
    pub code: Option<String>,
    pub faktur_date: Option<NaiveDate>,
    pub tms_created: Option<NaiveDateTime>,
    pub route_created: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub route_id: Option<String>,
    pub tms_complete: Option<NaiveDateTime>,
    pub location_confirmation: Option<NaiveDate>,
    pub faktur_total_quantity: Option<Decimal>,
    pub tms_total_quantity: Option<Decimal>,
    pub total_return: Option<Decimal>,
    pub total_net_value: Option<Decimal>,
}

impl FactRow for FactOrderRow {
    const DATASET: &'static str = "fact_order";
    const TABLE: &'static str = "tms_fact_order";
    const COLUMNS: &'static [&'static str] = &[
        "status",
        "manifest_reference",
        "order_id",
        "manifest_integration_id",
        "external_expedition_type",
        "driver_name",
        "code",
        "faktur_date",
        "tms_created",
        "route_created",
        "delivery_date",
        "route_id",
        "tms_complete",
        "location_confirmation",
        "faktur_total_quantity",
        "tms_total_quantity",
        "total_return",
        "total_net_value",
    ];
    const KEY_COLUMNS: &'static [&'static str] = &["order_id"];

    fn into_cells(self) -> Vec<Cell> {
        vec![
            Cell::Text(self.status),
            Cell::Text(self.manifest_reference),
            Cell::Text(self.order_id),
            Cell::Text(self.manifest_integration_id),
            Cell::Text(self.external_expedition_type),
            Cell::Text(self.driver_name),
            Cell::Text(self.code),
            Cell::Date(self.faktur_date),
            Cell::Timestamp(self.tms_created),
            Cell::Date(self.route_created),
            Cell::Date(self.delivery_date),
            Cell::Text(self.route_id),
            Cell::Timestamp(self.tms_complete),
            Cell::Date(self.location_confirmation),
            Cell::Numeric(self.faktur_total_quantity),
            Cell::Numeric(self.tms_total_quantity),
            Cell::Numeric(self.total_return),
            Cell::Numeric(self.total_net_value),
        ]
    }
}

/// Extraction SQL against `schema`
///
/// Binds `$1` (first faktur date) and `$2` (last faktur date), both inclusive.
/// Every output column is cast to the warehouse column type.
pub fn query_sql(schema: &str) -> String {
    let s = quote_ident(schema);
    format!(
        r#"
SELECT
    a.status::varchar AS status,
    c.manifest_reference::varchar AS manifest_reference,
    a.order_id::varchar AS order_id,
    c.manifest_integration_id::varchar AS manifest_integration_id,
    c.external_expedition_type::varchar AS external_expedition_type,
    d.driver_name::varchar AS driver_name,
    e.code::varchar AS code,
    a.faktur_date::date AS faktur_date,
    a.created_date::timestamp AS tms_created,
    DATE(c.created_date) AS route_created,
    a.delivery_date::date AS delivery_date,
    c.route_id::varchar AS route_id,
    a.updated_date::timestamp AS tms_complete,
    DATE(g.location_confirmation_timestamp) AS location_confirmation,
    SUM(od.quantity_faktur)::numeric AS faktur_total_quantity,
    SUM(od.quantity_delivery)::numeric AS tms_total_quantity,
    (SUM(od.quantity_delivery) - SUM(od.quantity_unloading))::numeric AS total_return,
    SUM(od.net_price)::numeric AS total_net_value
FROM {s}."order" AS a
LEFT JOIN {s}.route_detail AS b ON b.order_id = a.order_id
LEFT JOIN {s}.route AS c ON c.route_id = b.route_id
LEFT JOIN {s}.dma_driver AS d ON d.driver_id = c.driver_id
LEFT JOIN {s}.mst_vehicle AS e ON e.mst_vehicle_id = c.vehicle_id
LEFT JOIN {s}.driver_tasks AS f ON f.order_id = a.order_id
LEFT JOIN {s}.driver_task_confirmations AS g ON g.driver_task_id = f.driver_task_id
LEFT JOIN {s}.order_detail AS od ON od.order_id = a.order_id
WHERE a.faktur_date >= $1
  AND a.faktur_date <= $2
GROUP BY
    a.status,
    c.manifest_reference,
    a.order_id,
    c.manifest_integration_id,
    c.external_expedition_type,
    d.driver_name,
    e.code,
    a.faktur_date,
    a.created_date,
    c.created_date,
    a.delivery_date,
    c.route_id,
    a.updated_date,
    g.location_confirmation_timestamp
ORDER BY a.faktur_date DESC
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_is_parameterized() {
        let sql = query_sql("public");
        assert!(sql.contains("a.faktur_date >= $1"));
        assert!(sql.contains("a.faktur_date <= $2"));
        assert!(!sql.contains("2024-12-01"));
        assert!(sql.contains(r#"FROM "public"."order" AS a"#));
    }

    #[test]
    fn test_query_selects_every_column_in_order() {
        let sql = query_sql("public");
        let mut last = 0;
        for column in FactOrderRow::COLUMNS {
            let needle = format!(" AS {},", column);
            let needle_last = format!(" AS {}\n", column);
            let pos = sql
                .find(&needle)
                .or_else(|| sql.find(&needle_last))
                .unwrap_or_else(|| panic!("column {} missing", column));
            assert!(pos > last, "column {} out of order", column);
            last = pos;
        }
        assert_eq!(FactOrderRow::COLUMNS.len(), 18);
    }

    #[test]
    fn test_cells_follow_columns() {
        let row = FactOrderRow {
            order_id: Some("O1".into()),
            total_net_value: Some(Decimal::new(12345, 2)),
            ..FactOrderRow::default()
        };
        let cells = row.into_cells();
        assert_eq!(cells.len(), FactOrderRow::COLUMNS.len());
        assert_eq!(cells[2], Cell::text("O1"));
        assert_eq!(cells[17], Cell::Numeric(Some(Decimal::new(12345, 2))));
    }
}
