//! HTTP API tests over memory backends

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use syncsrv::api::{create_router, AppState};
use syncsrv::store::FailPoint;
use tower::util::ServiceExt;

mod common;
use common::{date, delivery, order, Harness};

fn router(h: &Harness) -> axum::Router {
    create_router(AppState::new(h.manager.clone()))
}

/// Helper to make GET requests and decode the body
async fn json_request(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let body: Value = if body_bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };

    (status, body)
}

#[tokio::test]
async fn test_health_check() {
    let h = Harness::new();
    let (status, body) = json_request(&router(&h), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "syncsrv");
}

#[tokio::test]
async fn test_dashboard_served() {
    let h = Harness::new();
    let app = router(&h);

    for uri in ["/", "/status", "/status/fact_order"] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("http-equiv=\"refresh\" content=\"30\""));
    }
}

#[tokio::test]
async fn test_status_on_empty_log() {
    let h = Harness::new();
    let (status, body) = json_request(&router(&h), "/api/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats"]["total_syncs"], 0);
    assert_eq!(body["stats"]["last_sync"], "Never");
    assert_eq!(body["sync_history"], json!([]));
}

#[tokio::test]
async fn test_trigger_then_status() {
    let h = Harness::new();
    h.source
        .set_orders(vec![order("O1", date(2025, 1, 3), 100)]);
    h.source.set_deliveries(vec![delivery("R1", "D1", "O1")]);
    let app = router(&h);

    let (status, body) = json_request(&app, "/sync/fact_order").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "fact_order sync completed successfully");

    let (status, _) = json_request(&app, "/sync/both").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = json_request(&app, "/api/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats"]["total_syncs"], 2);
    assert_eq!(body["stats"]["successful_syncs"], 2);
    assert_eq!(body["stats"]["failed_syncs"], 0);
    assert_eq!(body["sync_history"][0]["sync_type"], "both");
    assert_eq!(body["sync_history"][0]["records_processed"], 2);
    assert_eq!(body["sync_history"][1]["status"], "SUCCESS");

    let (_, body) = json_request(&app, "/api/status?type=fact_order&limit=5").await;
    assert_eq!(body["stats"]["total_syncs"], 1);
    assert_eq!(body["sync_history"][0]["sync_type"], "fact_order");
}

#[tokio::test]
async fn test_failed_trigger_returns_500() {
    let h = Harness::new();
    h.source
        .set_orders(vec![order("O1", date(2025, 1, 3), 100)]);
    h.target.inject(FailPoint::Merge);

    let (status, body) = json_request(&router(&h), "/sync/fact_order").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("injected merge failure"));
    assert_eq!(h.log.entries()[0].status, syncsrv::SyncStatus::Failed);
}

#[tokio::test]
async fn test_unknown_sync_type_is_bad_request() {
    let h = Harness::new();
    let (status, body) = json_request(&router(&h), "/sync/weekly").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert!(h.log.entries().is_empty());
}

#[tokio::test]
async fn test_status_error_body() {
    let h = Harness::new();
    h.log.set_unavailable(true);

    let (status, body) = json_request(&router(&h), "/api/status").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("unavailable"));
}

#[tokio::test]
async fn test_status_rejects_unknown_filter() {
    let h = Harness::new();
    let (status, body) = json_request(&router(&h), "/api/status?type=weekly").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_status_rejects_non_numeric_limit() {
    let h = Harness::new();
    let app = router(&h);

    let (status, body) = json_request(&app, "/api/status?limit=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("abc"));

    let (status, body) = json_request(&app, "/api/status?limit=").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["sync_history"].is_array());
}
