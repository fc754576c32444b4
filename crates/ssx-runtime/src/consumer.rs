//! Message-driven half of the pipeline.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ssx_db::{ClaimOutcome, ClaimRequest, ProcessingLedger, StoreError};
use ssx_erp::{ShipmentSink, SinkError};
use ssx_schemas::{Classify, ErrorClass, EventKey};
use tracing::{debug, info, warn};

use crate::message::QueueMessage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Applied { event_key: EventKey, retry_count: i32 },
    AlreadyCompleted { event_key: EventKey },
    InFlight { event_key: EventKey },
    /// Payload could not be decoded. Acknowledged and never retried.
    Dropped { reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("ledger: {0}")]
    Ledger(#[from] StoreError),

    /// The sink failed and the record is now FAILED.
    #[error("apply {event_key} failed: {source}")]
    Apply {
        event_key: EventKey,
        #[source]
        source: SinkError,
    },
}

impl Classify for ConsumerError {
    fn class(&self) -> ErrorClass {
        match self {
            ConsumerError::Ledger(e) => e.class(),
            ConsumerError::Apply { source, .. } => source.class(),
        }
    }
}

/// Exactly-once effect over an at-least-once transport, keyed by event key.
pub struct IdempotentConsumer {
    ledger: Arc<dyn ProcessingLedger>,
    sink: Arc<dyn ShipmentSink>,
    processing_lease: Option<Duration>,
}

impl IdempotentConsumer {
    pub fn new(ledger: Arc<dyn ProcessingLedger>, sink: Arc<dyn ShipmentSink>) -> Self {
        Self {
            ledger,
            sink,
            processing_lease: None,
        }
    }

    /// PROCESSING claims older than `lease` may be taken over.
    pub fn with_processing_lease(mut self, lease: Option<Duration>) -> Self {
        self.processing_lease = lease;
        self
    }

    pub async fn on_message(
        &self,
        message: &QueueMessage,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, ConsumerError> {
        let shipment = match message.decode() {
            Ok(s) => s,
            Err(e) => {
                warn!(
                    shipment_id = message.shipment_id_hint().unwrap_or("?"),
                    error = %e,
                    "dropping malformed message"
                );
                return Ok(ConsumeOutcome::Dropped {
                    reason: e.to_string(),
                });
            }
        };

        let event_key = shipment.event_key();
        let req = ClaimRequest {
            event_key: event_key.clone(),
            shipment_id: shipment.id.clone(),
            shipment_updated_at: shipment.last_updated,
            now,
            lease: self.processing_lease,
        };

        let retry_count = match self.ledger.claim(&req).await? {
            ClaimOutcome::Claimed { retry_count } => retry_count,
            ClaimOutcome::AlreadyCompleted => {
                debug!(event_key = %event_key, "already completed; skipping");
                return Ok(ConsumeOutcome::AlreadyCompleted { event_key });
            }
            ClaimOutcome::InFlight => {
                info!(event_key = %event_key, "claimed by another attempt; skipping");
                return Ok(ConsumeOutcome::InFlight { event_key });
            }
        };

        match self.sink.apply(&shipment, now).await {
            Ok(order) => {
                self.ledger.mark_completed(&event_key, now).await?;
                info!(
                    event_key = %event_key,
                    order_id = %order.id,
                    retry_count,
                    "shipment applied"
                );
                Ok(ConsumeOutcome::Applied {
                    event_key,
                    retry_count,
                })
            }
            Err(source) => {
                warn!(
                    event_key = %event_key,
                    retry_count,
                    class = %source.class(),
                    error = %source,
                    "apply failed"
                );
                self.ledger
                    .mark_failed(&event_key, &source.to_string(), now)
                    .await?;
                Err(ConsumerError::Apply { event_key, source })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::Map;
    use ssx_db::MemoryStore;
    use ssx_erp::ConflictMergeSink;
    use ssx_schemas::{Order, ProcessingStatus, Shipment};
    use std::collections::BTreeMap;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    fn message(order_id: Option<&str>) -> QueueMessage {
        QueueMessage::encode(&Shipment {
            id: "SHP-1".into(),
            status: Some("SHIPPED".into()),
            last_updated: t0(),
            order_id: order_id.map(str::to_string),
            fields: Map::new(),
        })
        .unwrap()
    }

    fn consumer(store: &Arc<MemoryStore>) -> IdempotentConsumer {
        IdempotentConsumer::new(store.clone(), Arc::new(ConflictMergeSink::new(store.clone())))
    }

    #[tokio::test]
    async fn second_delivery_is_a_no_op() {
        let store = Arc::new(MemoryStore::with_orders([Order::new("ORD-1")]));
        let c = consumer(&store);
        let msg = message(Some("ORD-1"));

        let first = c.on_message(&msg, t0()).await.unwrap();
        assert!(matches!(first, ConsumeOutcome::Applied { retry_count: 1, .. }));
        let second = c.on_message(&msg, t0()).await.unwrap();
        assert!(matches!(second, ConsumeOutcome::AlreadyCompleted { .. }));

        let key = EventKey::derive("SHP-1", &t0());
        let rec = store.fetch_record(&key).await.unwrap().unwrap();
        assert_eq!(rec.status, ProcessingStatus::Completed);
        assert_eq!(rec.retry_count, 1);
        assert_eq!(rec.processed_at, Some(t0()));
    }

    #[tokio::test]
    async fn sink_failure_marks_failed_and_signals() {
        let store = Arc::new(MemoryStore::new());
        let c = consumer(&store);

        let err = c.on_message(&message(Some("ORD-404")), t0()).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::NotFound);

        let key = EventKey::derive("SHP-1", &t0());
        let rec = store.fetch_record(&key).await.unwrap().unwrap();
        assert_eq!(rec.status, ProcessingStatus::Failed);
        assert!(rec.error.unwrap().contains("ORD-404"));
    }

    #[tokio::test]
    async fn malformed_payload_is_dropped_without_a_record() {
        let store = Arc::new(MemoryStore::new());
        let c = consumer(&store);
        let msg = QueueMessage {
            data: b"{".to_vec(),
            attributes: BTreeMap::new(),
        };
        let out = c.on_message(&msg, t0()).await.unwrap();
        assert!(matches!(out, ConsumeOutcome::Dropped { .. }));
        assert!(store.list_records(None, 10).await.unwrap().is_empty());
    }
}
