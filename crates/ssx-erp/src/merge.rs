use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ssx_db::OrderStore;
use ssx_schemas::{Order, Shipment};
use tracing::{info, warn};

use crate::verdict::{judge, next_status, MergeVerdict};
use crate::{order_id_of, ShipmentSink, SinkError};

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub order: Order,
    pub verdict: MergeVerdict,
}

/// Applies shipment snapshots to stored orders.
///
/// Fetch-judge-save for one order runs under that order's async lock, so
/// two shipments for the same order never interleave inside this process.
/// Distinct orders do not contend.
pub struct ConflictMergeSink {
    orders: Arc<dyn OrderStore>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConflictMergeSink {
    pub fn new(orders: Arc<dyn OrderStore>) -> Self {
        Self {
            orders,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn merge(
        &self,
        shipment: &Shipment,
        now: DateTime<Utc>,
    ) -> Result<MergeOutcome, SinkError> {
        let order_id = order_id_of(shipment)?;
        let lock = self.order_lock(order_id);
        let outcome = {
            let _guard = lock.lock().await;
            self.merge_locked(order_id, shipment, now).await
        };
        drop(lock);
        self.release_lock(order_id);
        outcome
    }

    async fn merge_locked(
        &self,
        order_id: &str,
        shipment: &Shipment,
        now: DateTime<Utc>,
    ) -> Result<MergeOutcome, SinkError> {
        let mut order = self
            .orders
            .fetch_order(order_id)
            .await?
            .ok_or_else(|| SinkError::OrderNotFound {
                order_id: order_id.to_string(),
            })?;

        let verdict = judge(&order, shipment);
        if verdict == MergeVerdict::FlagCorrupted {
            warn!(
                order_id,
                shipment_id = %shipment.id,
                last_updated = %shipment.last_updated,
                "stale replay with unchanged status; flagging order corrupted"
            );
        }

        order.status = next_status(verdict, shipment);
        order.shipment = Some(shipment.clone());
        order.updated_at = Some(now);
        self.orders.save_order(&order).await?;

        info!(
            order_id,
            shipment_id = %shipment.id,
            verdict = verdict.as_str(),
            status = order.status.as_str().unwrap_or("<unset>"),
            "order merged"
        );
        Ok(MergeOutcome { order, verdict })
    }

    fn order_lock(&self, order_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = match self.locks.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.entry(order_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drop the map entry once no task holds or waits on it.
    fn release_lock(&self, order_id: &str) {
        let mut map = match self.locks.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if map
            .get(order_id)
            .is_some_and(|l| Arc::strong_count(l) == 1)
        {
            map.remove(order_id);
        }
    }
}

#[async_trait]
impl ShipmentSink for ConflictMergeSink {
    async fn apply(&self, shipment: &Shipment, now: DateTime<Utc>) -> Result<Order, SinkError> {
        Ok(self.merge(shipment, now).await?.order)
    }
}
