//! ssx-erp
//!
//! Destination side of the pipeline: reconcile an incoming shipment snapshot
//! with the stored ERP order.

mod http;
mod merge;
pub mod verdict;

pub use http::HttpErpSink;
pub use merge::{ConflictMergeSink, MergeOutcome};
pub use verdict::{judge, MergeVerdict};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ssx_db::StoreError;
use ssx_schemas::{Classify, ErrorClass, Order, Shipment};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("shipment {shipment_id} carries no order_id")]
    MissingOrderId { shipment_id: String },

    #[error("order {order_id} not found")]
    OrderNotFound { order_id: String },

    #[error("order store: {0}")]
    Store(#[from] StoreError),

    #[error("erp transport error: {0}")]
    Transport(String),

    #[error("erp returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("erp response decode error: {0}")]
    Decode(String),
}

impl Classify for SinkError {
    fn class(&self) -> ErrorClass {
        match self {
            SinkError::MissingOrderId { .. } => ErrorClass::InvalidInput,
            SinkError::OrderNotFound { .. } => ErrorClass::NotFound,
            SinkError::Store(e) => e.class(),
            SinkError::Api { status: 404, .. } => ErrorClass::NotFound,
            SinkError::Api { status: 400, .. } => ErrorClass::InvalidInput,
            SinkError::Api { .. } | SinkError::Transport(_) | SinkError::Decode(_) => {
                ErrorClass::TransientNetwork
            }
        }
    }
}

/// Where the consumer sends a claimed shipment.
#[async_trait]
pub trait ShipmentSink: Send + Sync {
    /// Apply `shipment` to its order and return the stored result. `now` is
    /// the caller's clock; remote sinks stamp with their own.
    async fn apply(&self, shipment: &Shipment, now: DateTime<Utc>) -> Result<Order, SinkError>;
}

/// The order a shipment belongs to.
pub fn order_id_of(shipment: &Shipment) -> Result<&str, SinkError> {
    shipment
        .order_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SinkError::MissingOrderId {
            shipment_id: shipment.id.clone(),
        })
}
