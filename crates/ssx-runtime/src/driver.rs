//! The two trigger sources: a timer for the producer, a receive loop for the
//! consumer. Both stop when `shutdown` resolves.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::consumer::{ConsumeOutcome, IdempotentConsumer};
use crate::producer::CheckpointedProducer;
use crate::queue::{QueueError, QueueSource};

/// Counters for one or more consumer batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: usize,
    pub applied: usize,
    /// Already completed or in flight elsewhere.
    pub skipped: usize,
    pub dropped: usize,
    pub failed: usize,
}

impl ConsumerStats {
    fn absorb(&mut self, other: ConsumerStats) {
        self.received += other.received;
        self.applied += other.applied;
        self.skipped += other.skipped;
        self.dropped += other.dropped;
        self.failed += other.failed;
    }
}

/// Run the producer immediately and then every `interval` until `shutdown`.
/// A failed run is logged and the next tick tries again from the same
/// checkpoint. Returns the number of runs started.
pub async fn run_producer_on_schedule<F>(
    producer: &CheckpointedProducer,
    interval: Duration,
    shutdown: F,
) -> usize
where
    F: Future<Output = ()> + Send,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    let mut runs = 0usize;
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }
        runs += 1;
        match producer.run(Utc::now()).await {
            Ok(report) => info!(
                run = runs,
                published = report.published,
                checkpoint = %report.checkpoint_after,
                "scheduled producer run ok"
            ),
            Err(e) => error!(run = runs, error = %e, "scheduled producer run failed"),
        }
    }
    info!(runs, "producer schedule stopped");
    runs
}

/// Receive up to `max` deliveries and process each: ack on success, drop or
/// skip; nack on failure so the transport redelivers.
///
/// Only a failed receive is an error. A failed ack or nack is logged and the
/// rest of the batch is still processed; the lease expiry redelivers that
/// message and the ledger absorbs the repeat.
pub async fn process_batch(
    consumer: &IdempotentConsumer,
    source: &dyn QueueSource,
    max: usize,
) -> Result<ConsumerStats, QueueError> {
    let deliveries = source.receive(max).await?;
    let mut stats = ConsumerStats {
        received: deliveries.len(),
        ..ConsumerStats::default()
    };

    for delivery in &deliveries {
        match consumer.on_message(&delivery.message, Utc::now()).await {
            Ok(outcome) => {
                match outcome {
                    ConsumeOutcome::Applied { .. } => stats.applied += 1,
                    ConsumeOutcome::AlreadyCompleted { .. } | ConsumeOutcome::InFlight { .. } => {
                        stats.skipped += 1
                    }
                    ConsumeOutcome::Dropped { .. } => stats.dropped += 1,
                }
                if let Err(e) = source.ack(delivery).await {
                    warn!(receipt = %delivery.receipt, error = %e, "ack failed; lease expiry will redeliver");
                }
            }
            Err(e) => {
                stats.failed += 1;
                warn!(
                    receipt = %delivery.receipt,
                    delivery_count = delivery.delivery_count,
                    error = %e,
                    "message failed; releasing for redelivery"
                );
                if let Err(e) = source.nack(delivery).await {
                    warn!(receipt = %delivery.receipt, error = %e, "nack failed; lease expiry will redeliver");
                }
            }
        }
    }
    Ok(stats)
}

/// Poll `source` until `shutdown`. Sleeps `idle_wait` when a receive returns
/// nothing, when every delivery in the batch failed, or when the transport
/// errors, so a message that keeps failing is not redelivered in a hot loop.
///
/// `shutdown` is observed between batches and during the idle sleep, never
/// while a batch is in hand: a claimed ledger record always reaches
/// COMPLETED or FAILED before the loop returns.
pub async fn run_consumer_loop<F>(
    consumer: &IdempotentConsumer,
    source: &dyn QueueSource,
    batch_size: usize,
    idle_wait: Duration,
    shutdown: F,
) -> ConsumerStats
where
    F: Future<Output = ()> + Send,
{
    tokio::pin!(shutdown);
    let mut total = ConsumerStats::default();

    loop {
        if shutdown_requested(shutdown.as_mut()).await {
            break;
        }
        let pass = process_batch(consumer, source, batch_size).await;
        let idle = match pass {
            Ok(stats) => {
                total.absorb(stats);
                stats.failed == stats.received
            }
            Err(e) => {
                error!(error = %e, "queue receive failed");
                true
            }
        };
        if idle {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(idle_wait) => {}
            }
        }
    }
    info!(
        applied = total.applied,
        failed = total.failed,
        "consumer loop stopped"
    );
    total
}

/// Poll `shutdown` once without waiting.
async fn shutdown_requested<F>(shutdown: Pin<&mut F>) -> bool
where
    F: Future<Output = ()>,
{
    tokio::select! {
        biased;
        _ = shutdown => true,
        _ = std::future::ready(()) => false,
    }
}
