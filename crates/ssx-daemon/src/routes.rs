//! Axum router and HTTP handlers for ssx-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! the trace layer. Tests drive the bare router.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use ssx_schemas::{parse_timestamp, Classify, ErrorClass, ShipmentRecord, ShipmentRejection};
use tracing::{info, warn};

use crate::{
    api_types::{
        ErrorResponse, HealthResponse, OrderUpdatedResponse, ShipmentsQuery, ShipmentsResponse,
        INVALID_DATE, ORDER_NOT_FOUND, ORDER_UPDATED,
    },
    state::AppState,
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route(
            "/api/v1/shipments/",
            get(list_shipments).post(upsert_shipment),
        )
        .route("/api/v1/orders/:order_id/shipment/", post(update_order_shipment))
        .with_state(state)
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

/// Status code for an error class at this edge.
pub fn status_for(class: ErrorClass) -> StatusCode {
    match class {
        ErrorClass::NotFound => StatusCode::NOT_FOUND,
        ErrorClass::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorClass::TransientNetwork => StatusCode::BAD_GATEWAY,
        ErrorClass::DataConsistency => StatusCode::CONFLICT,
        ErrorClass::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn parse_record(body: &Bytes) -> Result<ShipmentRecord, Response> {
    serde_json::from_slice::<ShipmentRecord>(body)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, format!("Invalid JSON body: {e}")))
}

fn rejection_response(rejection: &ShipmentRejection) -> Response {
    match rejection {
        ShipmentRejection::BadTimestamp { .. } | ShipmentRejection::MissingTimestamp { .. } => {
            error_response(StatusCode::BAD_REQUEST, INVALID_DATE)
        }
        ShipmentRejection::MissingId => error_response(StatusCode::BAD_REQUEST, rejection.to_string()),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /api/v1/shipments/?last_updated=<ISO-8601>
// ---------------------------------------------------------------------------

pub(crate) async fn list_shipments(
    State(st): State<Arc<AppState>>,
    Query(q): Query<ShipmentsQuery>,
) -> Response {
    let Some(raw) = q.last_updated.filter(|s| !s.trim().is_empty()) else {
        return (StatusCode::OK, Json(ShipmentsResponse { data: Vec::new() })).into_response();
    };

    let since = match parse_timestamp(&raw) {
        Ok(ts) => ts,
        Err(e) => {
            warn!(last_updated = %raw, error = %e, "rejecting shipments query");
            return error_response(StatusCode::BAD_REQUEST, INVALID_DATE);
        }
    };

    let data = st.shipments.records_since(Some(since));
    info!(%since, count = data.len(), "shipments listed");
    (StatusCode::OK, Json(ShipmentsResponse { data })).into_response()
}

// ---------------------------------------------------------------------------
// POST /api/v1/shipments/  (seed or replace one feed record)
// ---------------------------------------------------------------------------

pub(crate) async fn upsert_shipment(State(st): State<Arc<AppState>>, body: Bytes) -> Response {
    let record = match parse_record(&body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    if let Err(rejection) = record.validate() {
        return rejection_response(&rejection);
    }
    st.shipments.upsert(record.clone());
    (StatusCode::CREATED, Json(serde_json::json!({ "data": record }))).into_response()
}

// ---------------------------------------------------------------------------
// POST /api/v1/orders/:order_id/shipment/
// ---------------------------------------------------------------------------

/// Apply a shipment snapshot to an order through the conflict merge.
///
/// Checked in this order: JSON body (400), order exists (404), shipment
/// id and timestamp (400). The path `order_id` wins over any `order_id` in
/// the body.
pub(crate) async fn update_order_shipment(
    State(st): State<Arc<AppState>>,
    Path(order_id): Path<String>,
    body: Bytes,
) -> Response {
    let record = match parse_record(&body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    match st.orders.fetch_order(&order_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(StatusCode::NOT_FOUND, ORDER_NOT_FOUND),
        Err(e) => {
            warn!(order_id = %order_id, error = %e, "order lookup failed");
            return error_response(status_for(e.class()), e.to_string());
        }
    }

    let mut shipment = match record.validate() {
        Ok(s) => s,
        Err(rejection) => {
            warn!(order_id = %order_id, reason = %rejection, "rejecting shipment update");
            return rejection_response(&rejection);
        }
    };
    shipment.order_id = Some(order_id.clone());

    match st.merge.merge(&shipment, Utc::now()).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(OrderUpdatedResponse {
                message: ORDER_UPDATED.to_string(),
                data: outcome.order,
            }),
        )
            .into_response(),
        Err(e) => {
            let status = status_for(e.class());
            if status == StatusCode::NOT_FOUND {
                return error_response(status, ORDER_NOT_FOUND);
            }
            warn!(order_id = %order_id, error = %e, "merge failed");
            error_response(status, e.to_string())
        }
    }
}
