//! In-process scenario tests for ssx-daemon HTTP endpoints.
//!
//! These tests build the Axum router without binding a TCP socket and drive
//! it via `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use ssx_daemon::{routes, state::AppState};
use ssx_db::{MemoryStore, OrderStore};
use ssx_feed::ShipmentCatalog;
use ssx_schemas::{Order, ShipmentRecord};
use tower::ServiceExt; // oneshot

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn order(id: &str, status: &str, last_updated: &str) -> Order {
    serde_json::from_value(json!({
        "id": id,
        "status": status,
        "shipment": {"id": format!("SHP-{id}"), "status": status, "last_updated": last_updated},
        "customer": "ACME"
    }))
    .unwrap()
}

fn record(v: Value) -> ShipmentRecord {
    serde_json::from_value(v).unwrap()
}

fn make_state() -> (Arc<MemoryStore>, Arc<AppState>) {
    let store = Arc::new(MemoryStore::with_orders([order(
        "ORD-1",
        "SHIPPED",
        "2024-03-01T10:00:00Z",
    )]));
    let catalog = Arc::new(ShipmentCatalog::new(vec![
        record(json!({"id": "SHP-A", "status": "SHIPPED", "last_updated": "2024-01-01T00:00:00Z"})),
        record(json!({"id": "SHP-B", "status": "DELIVERED", "last_updated": "2024-01-01T00:00:00.001Z"})),
        record(json!({"id": "SHP-C", "status": "SHIPPED", "last_updated": "2023-12-31T23:59:59.999"})),
    ]));
    let st = Arc::new(AppState::new(store.clone(), catalog));
    (store, st)
}

async fn call(router: axum::Router, req: Request<axum::body::Body>) -> (StatusCode, Value) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    let json = serde_json::from_slice(&body).expect("body is not valid JSON");
    (status, json)
}

fn get(uri: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap()
}

fn ids(json: &Value) -> Vec<String> {
    json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap().to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_200_ok_true() {
    let (_, st) = make_state();
    let (status, json) = call(routes::build_router(st), get("/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "ssx-daemon");
    assert!(json["version"].is_string());
}

// ---------------------------------------------------------------------------
// GET /api/v1/shipments/
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shipments_without_last_updated_is_empty() {
    let (_, st) = make_state();
    let (status, json) = call(routes::build_router(st), get("/api/v1/shipments/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"data": []}));
}

#[tokio::test]
async fn shipments_bound_is_inclusive() {
    let (_, st) = make_state();
    let (status, json) = call(
        routes::build_router(st),
        get("/api/v1/shipments/?last_updated=2024-01-01T00:00:00Z"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let mut got = ids(&json);
    got.sort();
    assert_eq!(got, vec!["SHP-A", "SHP-B"]);
}

#[tokio::test]
async fn shipments_naive_and_offset_bounds_normalize_to_utc() {
    let (_, st) = make_state();
    // 02:00+02:00 == 00:00Z, so SHP-A (exactly 00:00Z) is included.
    let (_, json) = call(
        routes::build_router(st.clone()),
        get("/api/v1/shipments/?last_updated=2024-01-01T02:00:00%2B02:00"),
    )
    .await;
    assert_eq!(ids(&json).len(), 2);

    let (_, json) = call(
        routes::build_router(st),
        get("/api/v1/shipments/?last_updated=2023-12-31T23:59:59.999"),
    )
    .await;
    assert_eq!(ids(&json).len(), 3);
}

#[tokio::test]
async fn shipments_malformed_last_updated_is_400() {
    let (_, st) = make_state();
    let (status, json) = call(
        routes::build_router(st),
        get("/api/v1/shipments/?last_updated=yesterday"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        json["error"],
        "Invalid date format. Use ISO 8601 (e.g., 2024-01-01T00:00:00Z)"
    );
}

#[tokio::test]
async fn posted_shipment_is_served_by_the_feed() {
    let (_, st) = make_state();
    let (status, _) = call(
        routes::build_router(st.clone()),
        post_json(
            "/api/v1/shipments/",
            json!({"id": "SHP-N", "status": "SHIPPED", "last_updated": "2025-01-01T00:00:00Z"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, json) = call(
        routes::build_router(st),
        get("/api/v1/shipments/?last_updated=2025-01-01T00:00:00Z"),
    )
    .await;
    assert_eq!(ids(&json), vec!["SHP-N"]);
}

// ---------------------------------------------------------------------------
// POST /api/v1/orders/:order_id/shipment/
// ---------------------------------------------------------------------------

#[tokio::test]
async fn newer_shipment_updates_order() {
    let (store, st) = make_state();
    let (status, json) = call(
        routes::build_router(st),
        post_json(
            "/api/v1/orders/ORD-1/shipment/",
            json!({"id": "SHP-ORD-1", "status": "DELIVERED", "last_updated": "2024-03-02T10:00:00Z"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Order status updated successfully");
    assert_eq!(json["data"]["status"], "DELIVERED");
    assert_eq!(json["data"]["customer"], "ACME");
    assert_eq!(json["data"]["shipment"]["order_id"], "ORD-1");

    let stored = store.fetch_order("ORD-1").await.unwrap().unwrap();
    assert!(stored.updated_at.is_some());
}

#[tokio::test]
async fn stale_same_status_marks_order_corrupted() {
    let (_, st) = make_state();
    let (status, json) = call(
        routes::build_router(st),
        post_json(
            "/api/v1/orders/ORD-1/shipment/",
            // Naive timestamp: read as UTC, one hour older than the stored one.
            json!({"id": "SHP-ORD-1", "status": "SHIPPED", "last_updated": "2024-03-01T09:00:00"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "corrupted");
    assert_eq!(json["data"]["shipment"]["last_updated"], "2024-03-01T09:00:00.000Z");
}

#[tokio::test]
async fn unknown_order_is_404() {
    let (_, st) = make_state();
    let (status, json) = call(
        routes::build_router(st),
        post_json(
            "/api/v1/orders/ORD-404/shipment/",
            json!({"id": "SHP-X", "status": "SHIPPED", "last_updated": "2024-03-02T10:00:00Z"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json, json!({"error": "Order not found"}));
}

#[tokio::test]
async fn invalid_shipment_timestamp_is_400() {
    let (store, st) = make_state();
    let before = store.fetch_order("ORD-1").await.unwrap();
    let (status, json) = call(
        routes::build_router(st),
        post_json(
            "/api/v1/orders/ORD-1/shipment/",
            json!({"id": "SHP-ORD-1", "status": "SHIPPED", "last_updated": "not-a-date"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().starts_with("Invalid date format"));
    assert_eq!(store.fetch_order("ORD-1").await.unwrap(), before);
}

#[tokio::test]
async fn non_json_body_is_400() {
    let (_, st) = make_state();
    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/orders/ORD-1/shipment/")
        .body(axum::body::Body::from("garbage"))
        .unwrap();
    let (status, json) = call(routes::build_router(st), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().starts_with("Invalid JSON body"));
}
