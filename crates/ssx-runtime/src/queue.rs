//! Transport seam: the producer publishes, the consumer driver receives.
//!
//! The transport is at-least-once. `ack` removes a delivery for good; `nack`
//! (or an expired lease) makes it eligible for redelivery.

use async_trait::async_trait;
use ssx_schemas::{Classify, ErrorClass};

use crate::message::QueueMessage;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("publish not acknowledged: {0}")]
    Publish(String),
    #[error("queue transport error: {0}")]
    Transport(String),
}

impl Classify for QueueError {
    fn class(&self) -> ErrorClass {
        ErrorClass::TransientNetwork
    }
}

/// One received message. `receipt` identifies it to `ack`/`nack`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub receipt: String,
    pub message: QueueMessage,
    /// 1 on first delivery.
    pub delivery_count: u32,
}

#[async_trait]
pub trait QueuePublisher: Send + Sync {
    /// Resolves once the transport has durably accepted the message.
    async fn publish(&self, message: QueueMessage) -> Result<String, QueueError>;
}

#[async_trait]
pub trait QueueSource: Send + Sync {
    /// Up to `max` deliveries; empty when nothing is visible.
    async fn receive(&self, max: usize) -> Result<Vec<Delivery>, QueueError>;

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    async fn nack(&self, delivery: &Delivery) -> Result<(), QueueError>;
}
