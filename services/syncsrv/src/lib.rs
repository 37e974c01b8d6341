//! TMS data warehouse sync
//!
//! Pulls the `fact_order` and `fact_delivery` datasets out of the operational
//! TMS database (A) and merges them into the reporting warehouse (B).
//!
//! ```text
//!  ┌──────────────┐  fetch   ┌──────────────┐  stage + merge  ┌──────────────┐
//!  │ Database A   │ ───────► │ SyncManager  │ ──────────────► │ Database B   │
//!  │ (FactSource) │          │ orchestrator │                 │ (TargetStore)│
//!  └──────────────┘          └──────┬───────┘                 └──────────────┘
//!                                   │ RUNNING / SUCCESS / FAILED
//!                                   ▼
//!                            ┌──────────────┐
//!                            │  sync_log    │ ◄── dashboard, syncctl status
//!                            └──────────────┘
//! ```
//!
//! Backends sit behind the traits in [`store`]; Postgres for production,
//! memory for tests.

pub mod api;
pub mod config;
pub mod db;
pub mod facts;
pub mod maintenance;
pub mod orchestrator;
pub mod schema;
pub mod status;
pub mod store;
pub mod sync_log;
pub mod upsert;

pub use config::Config;
pub use db::Databases;
pub use facts::{Cell, DateRange, FactDeliveryRow, FactOrderRow, FactRow, RowSet};
pub use orchestrator::{SyncManager, SyncReport};
pub use sync_log::{SyncLogEntry, SyncStatus, SyncType};
