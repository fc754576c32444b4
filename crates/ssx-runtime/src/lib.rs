//! ssx-runtime
//!
//! The pipeline proper: the producer publishes shipment snapshots to a
//! queue, the consumer applies each one to the ERP exactly once in effect.
//! Transport, feed, sink and stores are injected, so the same code runs
//! against Postgres and HTTP in production and in-memory fakes in tests.

mod consumer;
mod driver;
mod message;
mod pg_queue;
mod producer;
mod queue;

pub use consumer::{ConsumeOutcome, ConsumerError, IdempotentConsumer};
pub use driver::{process_batch, run_consumer_loop, run_producer_on_schedule, ConsumerStats};
pub use message::{DecodeError, QueueMessage, ATTR_SHIPMENT_ID, ATTR_UPDATED_AT};
pub use pg_queue::PgQueue;
pub use producer::{CheckpointedProducer, ProducerError, ProducerReport, ProducerSettings};
pub use queue::{Delivery, QueueError, QueuePublisher, QueueSource};
