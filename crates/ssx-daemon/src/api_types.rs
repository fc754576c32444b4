//! Request and response bodies for the daemon's HTTP endpoints.
//!
//! No business logic lives here.

use serde::{Deserialize, Serialize};
use ssx_schemas::{Order, ShipmentRecord};

pub const ORDER_UPDATED: &str = "Order status updated successfully";
pub const ORDER_NOT_FOUND: &str = "Order not found";
pub const INVALID_DATE: &str = "Invalid date format. Use ISO 8601 (e.g., 2024-01-01T00:00:00Z)";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

/// Every non-2xx body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// POST /api/v1/orders/{order_id}/shipment/ on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderUpdatedResponse {
    pub message: String,
    pub data: Order,
}

/// GET /api/v1/shipments/
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentsResponse {
    pub data: Vec<ShipmentRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShipmentsQuery {
    #[serde(default)]
    pub last_updated: Option<String>,
}
