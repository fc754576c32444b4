//! Scenario: Concurrent Delivery Claims Once
//!
//! # Invariant under test
//! When several consumers receive the same event at the same moment, the
//! ledger claim lets exactly one of them apply it. The rest see the event as
//! in flight or already completed, the sink is hit once, and the ledger ends
//! with a single COMPLETED record on its first attempt.
//!
//! Runs on a multi-threaded runtime so claims genuinely race.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ssx_db::ProcessingLedger;
use ssx_erp::{ShipmentSink, SinkError};
use ssx_runtime::{ConsumeOutcome, IdempotentConsumer, QueueMessage};
use ssx_schemas::{Order, ProcessingStatus, Shipment};
use ssx_testkit::{record, shipment, t0, Pipeline};

const CONSUMERS: usize = 8;

/// Holds each apply open long enough for the other claims to land.
struct Lingering(Arc<dyn ShipmentSink>);

#[async_trait]
impl ShipmentSink for Lingering {
    async fn apply(&self, shipment: &Shipment, now: DateTime<Utc>) -> Result<Order, SinkError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.0.apply(shipment, now).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_deliveries_apply_exactly_once() {
    let s = shipment("SHP-RACE", "ORD-RACE", "SHIPPED", t0());
    let p = Pipeline::new(vec![Order::new("ORD-RACE")], vec![record(&s)], t0())
        .await
        .unwrap();
    let consumer = Arc::new(IdempotentConsumer::new(
        p.store.clone(),
        Arc::new(Lingering(p.sink.clone())),
    ));
    let message = QueueMessage::encode(&s).unwrap();

    let handles: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let consumer = consumer.clone();
            let message = message.clone();
            tokio::spawn(async move { consumer.on_message(&message, t0()).await })
        })
        .collect();

    let mut applied = Vec::new();
    let mut skipped = 0;
    for h in handles {
        match h.await.unwrap().unwrap() {
            ConsumeOutcome::Applied { retry_count, .. } => applied.push(retry_count),
            ConsumeOutcome::InFlight { .. } | ConsumeOutcome::AlreadyCompleted { .. } => {
                skipped += 1
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    assert_eq!(applied, vec![1]);
    assert_eq!(skipped, CONSUMERS - 1);
    assert_eq!(p.sink.applies(), 1);

    let records = p.store.list_records(None, 10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].event_key, s.event_key());
    assert_eq!(records[0].status, ProcessingStatus::Completed);
    assert_eq!(records[0].retry_count, 1);
}
