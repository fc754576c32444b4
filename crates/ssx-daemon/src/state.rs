//! Shared state for ssx-daemon handlers.

use std::sync::Arc;

use ssx_db::{MemoryStore, OrderStore};
use ssx_erp::ConflictMergeSink;
use ssx_feed::ShipmentCatalog;

/// Static build metadata included in health responses.
#[derive(Clone, Debug)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Shared across all handlers as `State<Arc<AppState>>`.
pub struct AppState {
    pub build: BuildInfo,
    pub orders: Arc<dyn OrderStore>,
    /// All order writes go through here so one order has one writer.
    pub merge: ConflictMergeSink,
    /// What GET /api/v1/shipments/ serves.
    pub shipments: Arc<ShipmentCatalog>,
}

impl AppState {
    pub fn new(orders: Arc<dyn OrderStore>, shipments: Arc<ShipmentCatalog>) -> Self {
        Self {
            build: BuildInfo {
                service: "ssx-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            merge: ConflictMergeSink::new(Arc::clone(&orders)),
            orders,
            shipments,
        }
    }

    /// Empty in-memory backend with an empty shipment catalog.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(ShipmentCatalog::default()))
    }
}
