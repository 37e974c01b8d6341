//! `fact_delivery`: one row per route stop, order and order line
//!
//! Unlike `fact_order` this query has no date window; every run reads the
//! full history.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use sqlx::FromRow;

use super::{Cell, FactRow};
use crate::store::quote_ident;

#[derive(Debug, Clone, Default, PartialEq, FromRow)]
pub struct FactDeliveryRow {
    pub route_id: Option<String>,
    pub manifest_reference: Option<String>,
    pub route_detail_id: Option<String>,
    pub order_id: Option<String>,
    pub do_number: Option<String>,
    pub faktur_date: Option<NaiveDate>,
    pub created_date_only: Option<NaiveDate>,
    pub waktu: Option<NaiveTime>,
    pub delivery_date: Option<NaiveDate>,
    pub status: Option<String>,
    pub client_id: Option<String>,
    pub warehouse_id: Option<String>,
    pub origin_name: Option<String>,
    pub origin_city: Option<String>,
    pub customer_id: Option<String>,
    pub code: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub address_text: Option<String>,
    pub external_expedition_type: Option<String>,
    pub vehicle_id: Option<String>,
    pub driver_id: Option<String>,
    pub plate_number: Option<String>,
    pub driver_name: Option<String>,
    pub kenek_id: Option<String>,
    pub kenek_name: Option<String>,
    pub driver_status: Option<String>,
    pub manifest_integration_id: Option<String>,
    pub complete_time: Option<NaiveDateTime>,
    pub net_price: Option<Decimal>,
    pub quantity_delivery: Option<Decimal>,
    pub quantity_faktur: Option<Decimal>,
}

impl FactRow for FactDeliveryRow {
    const DATASET: &'static str = "fact_delivery";
    const TABLE: &'static str = "tms_fact_delivery";
    const COLUMNS: &'static [&'static str] = &[
        "route_id",
        "manifest_reference",
        "route_detail_id",
        "order_id",
        "do_number",
        "faktur_date",
        "created_date_only",
        "waktu",
        "delivery_date",
        "status",
        "client_id",
        "warehouse_id",
        "origin_name",
        "origin_city",
        "customer_id",
        "code",
        "name",
        "address",
        "address_text",
        "external_expedition_type",
        "vehicle_id",
        "driver_id",
        "plate_number",
        "driver_name",
        "kenek_id",
        "kenek_name",
        "driver_status",
        "manifest_integration_id",
        "complete_time",
        "net_price",
        "quantity_delivery",
        "quantity_faktur",
    ];
    const KEY_COLUMNS: &'static [&'static str] = &["route_id", "route_detail_id", "order_id"];

    fn into_cells(self) -> Vec<Cell> {
        vec![
            Cell::Text(self.route_id),
            Cell::Text(self.manifest_reference),
            Cell::Text(self.route_detail_id),
            Cell::Text(self.order_id),
            Cell::Text(self.do_number),
            Cell::Date(self.faktur_date),
            Cell::Date(self.created_date_only),
            Cell::Time(self.waktu),
            Cell::Date(self.delivery_date),
            Cell::Text(self.status),
            Cell::Text(self.client_id),
            Cell::Text(self.warehouse_id),
            Cell::Text(self.origin_name),
            Cell::Text(self.origin_city),
            Cell::Text(self.customer_id),
            Cell::Text(self.code),
            Cell::Text(self.name),
            Cell::Text(self.address),
            Cell::Text(self.address_text),
            Cell::Text(self.external_expedition_type),
            Cell::Text(self.vehicle_id),
            Cell::Text(self.driver_id),
            Cell::Text(self.plate_number),
            Cell::Text(self.driver_name),
            Cell::Text(self.kenek_id),
            Cell::Text(self.kenek_name),
            Cell::Text(self.driver_status),
            Cell::Text(self.manifest_integration_id),
            Cell::Timestamp(self.complete_time),
            Cell::Numeric(self.net_price),
            Cell::Numeric(self.quantity_delivery),
            Cell::Numeric(self.quantity_faktur),
        ]
    }
}

/// Extraction SQL against `schema`, no bound parameters
pub fn query_sql(schema: &str) -> String {
    let s = quote_ident(schema);
    format!(
        r#"
SELECT
    a.route_id::varchar AS route_id,
    a.manifest_reference::varchar AS manifest_reference,
    b.route_detail_id::varchar AS route_detail_id,
    b.order_id::varchar AS order_id,
    c.do_number::varchar AS do_number,
    c.faktur_date::date AS faktur_date,
    DATE(a.created_date) AS created_date_only,
    a.created_date::timestamp::time AS waktu,
    c.delivery_date::date AS delivery_date,
    a.status::varchar AS status,
    c.client_id::varchar AS client_id,
    c.warehouse_id::varchar AS warehouse_id,
    c.origin_name::varchar AS origin_name,
    c.origin_city::varchar AS origin_city,
    c.customer_id::varchar AS customer_id,
    e.code::varchar AS code,
    e."name"::varchar AS name,
    d.address::text AS address,
    d.address_text::text AS address_text,
    a.external_expedition_type::varchar AS external_expedition_type,
    a.vehicle_id::varchar AS vehicle_id,
    a.driver_id::varchar AS driver_id,
    f.plate_number::varchar AS plate_number,
    g.driver_name::varchar AS driver_name,
    a.kenek_id::varchar AS kenek_id,
    h.kenek_name::varchar AS kenek_name,
    a.driver_status::varchar AS driver_status,
    a.manifest_integration_id::varchar AS manifest_integration_id,
    i.complete_time::timestamp AS complete_time,
    j.net_price::numeric AS net_price,
    j.quantity_delivery::numeric AS quantity_delivery,
    j.quantity_faktur::numeric AS quantity_faktur
FROM {s}.route AS a
LEFT JOIN {s}.route_detail AS b ON b.route_id = a.route_id
LEFT JOIN {s}."order" AS c ON c.order_id = b.order_id
LEFT JOIN {s}.mst_location_child AS d ON d.mst_location_child_id = c.customer_id
LEFT JOIN {s}.mst_location_parent AS e ON e.mst_location_parent_id = d.mst_location_parent_id
LEFT JOIN {s}.mst_vehicle AS f ON f.mst_vehicle_id = a.vehicle_id
LEFT JOIN {s}.dma_driver AS g ON g.driver_id = a.driver_id
LEFT JOIN {s}.dma_kenek AS h ON h.kenek_id = a.kenek_id
LEFT JOIN {s}.driver_tasks AS i ON i.order_id = b.order_id
LEFT JOIN {s}.order_detail AS j ON j.order_id = b.order_id
"#
    )
}
