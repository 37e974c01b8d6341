//! HTTP surface: dashboard, status JSON and sync triggers
//!
//! Triggers run the sync inline; the request blocks until the run ends.
//! Nothing serializes concurrent triggers, so two overlapping requests run
//! two syncs side by side and rely on distinct staging names.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use common::{ActionResponse, AppError, ErrorResponse, HealthResponse};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::facts::DateRange;
use crate::orchestrator::SyncManager;
use crate::status;
use crate::sync_log::{parse_sync_type, SyncType};

const DASHBOARD_HTML: &str = include_str!("../assets/dashboard.html");

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SyncManager>,
    pub service_name: String,
}

impl AppState {
    pub fn new(manager: SyncManager) -> Self {
        Self {
            manager: Arc::new(manager),
            service_name: "syncsrv".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    #[serde(rename = "type")]
    pub sync_type: Option<String>,
    /// Kept as text so a bad number still gets a JSON error body
    pub limit: Option<String>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(dashboard))
        .route("/status", get(dashboard))
        .route("/status/{sync_type}", get(dashboard_filtered))
        .route("/api/status", get(get_status))
        .route("/sync/{sync_type}", get(trigger_sync))
        .layer(middleware::from_fn(common::logging::http_request_logger))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

/// The page reads the filter from its own URL
async fn dashboard_filtered(Path(_sync_type): Path<String>) -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

fn read_error(status: StatusCode, message: String) -> Response {
    (status, Json(ErrorResponse { error: message })).into_response()
}

/// `GET /api/status?type=&limit=`
async fn get_status(State(state): State<AppState>, Query(query): Query<StatusQuery>) -> Response {
    let filter: Option<SyncType> = match query.sync_type.as_deref() {
        None | Some("") | Some("all") => None,
        Some(raw) => match parse_sync_type(raw) {
            Ok(t) => Some(t),
            Err(e) => return read_error(StatusCode::BAD_REQUEST, e.to_string()),
        },
    };

    let limit = match query.limit.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match raw.parse::<i64>() {
            Ok(n) => Some(n),
            Err(_) => {
                return read_error(
                    StatusCode::BAD_REQUEST,
                    format!("Invalid limit '{}', expected an integer", raw),
                )
            },
        },
    };

    match status::snapshot(state.manager.log().as_ref(), filter, limit).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => {
            error!("Status query failed: {}", e);
            read_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        },
    }
}

/// `GET /sync/{type}`: run a sync now, full default range
async fn trigger_sync(
    State(state): State<AppState>,
    Path(raw_type): Path<String>,
) -> Result<Json<ActionResponse>, AppError> {
    let sync_type = parse_sync_type(&raw_type)?;
    info!("Manual {} sync requested", sync_type);

    state
        .manager
        .run(sync_type, DateRange::default())
        .await
        .map_err(|e| AppError::internal_error(e.to_string()))?;

    Ok(Json(ActionResponse::success(format!(
        "{} sync completed successfully",
        sync_type
    ))))
}
