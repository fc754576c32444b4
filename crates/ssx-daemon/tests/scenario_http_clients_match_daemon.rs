//! Scenario: the pipeline's HTTP clients against a live daemon.
//!
//! # Invariant under test
//! `HttpShipmentFeed` and `HttpErpSink` speak exactly the wire format the
//! daemon serves: inclusive `since` queries, `{data: [...]}` lists, the
//! `{message, data}` update body and 404 for unknown orders.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::{json, Map};
use ssx_daemon::{routes, state::AppState};
use ssx_db::MemoryStore;
use ssx_erp::{HttpErpSink, ShipmentSink};
use ssx_feed::{HttpShipmentFeed, ShipmentCatalog, ShipmentFeed};
use ssx_schemas::{Classify, Credential, ErrorClass, Order, Shipment, ShipmentRecord};

async fn serve(state: Arc<AppState>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, routes::build_router(state)).await;
    });
    format!("http://{addr}")
}

fn credential() -> Credential {
    Credential {
        access_token: "eyJ-contract".into(),
        token_type: "bearer".into(),
        created_at: Utc::now(),
        expires_in: 3600,
        refresh_token: None,
        x_refresh_token_expires_in: None,
        id_token: None,
        realm_id: None,
    }
}

#[tokio::test]
async fn feed_and_erp_clients_round_trip() {
    let record: ShipmentRecord = serde_json::from_value(json!({
        "id": "SHP-1", "status": "SHIPPED", "order_id": "ORD-1",
        "last_updated": "2024-03-01T10:00:00Z"
    }))
    .unwrap();
    let state = Arc::new(AppState::new(
        Arc::new(MemoryStore::with_orders([Order::new("ORD-1")])),
        Arc::new(ShipmentCatalog::new(vec![record])),
    ));
    let base = serve(state).await;

    let feed = HttpShipmentFeed::new(&base, Duration::from_secs(5)).unwrap();
    let since = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
    let listed = feed.list(Some(since), &credential()).await.unwrap();
    assert_eq!(listed.len(), 1);
    let later = feed
        .list(Some(since + chrono::Duration::milliseconds(1)), &credential())
        .await
        .unwrap();
    assert!(later.is_empty());

    let shipment = listed[0].validate().unwrap();
    let sink = HttpErpSink::new(&base, "erp-key", Duration::from_secs(5)).unwrap();
    let order = sink.apply(&shipment, Utc::now()).await.unwrap();
    assert_eq!(order.id, "ORD-1");
    assert_eq!(order.status.as_str(), Some("SHIPPED"));
    assert_eq!(order.shipment_last_updated(), Some(since));

    let orphan = Shipment {
        id: "SHP-2".into(),
        status: Some("SHIPPED".into()),
        last_updated: since,
        order_id: Some("ORD-404".into()),
        fields: Map::new(),
    };
    let err = sink.apply(&orphan, Utc::now()).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::NotFound);
}
