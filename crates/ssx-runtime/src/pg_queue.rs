//! Postgres queue table as the pipeline transport.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use ssx_db::{queue_ack, queue_claim_batch, queue_publish, queue_release, QueueRow};
use tracing::warn;
use uuid::Uuid;

use crate::message::QueueMessage;
use crate::queue::{Delivery, QueueError, QueuePublisher, QueueSource};

#[derive(Debug, Clone)]
pub struct PgQueue {
    pool: PgPool,
    topic: String,
    lease_owner: String,
    ack_deadline: chrono::Duration,
}

impl PgQueue {
    /// `lease_owner` identifies this process in the lease column; each
    /// consumer process should use a distinct one.
    pub fn new(
        pool: PgPool,
        topic: impl Into<String>,
        lease_owner: impl Into<String>,
        ack_deadline: Duration,
    ) -> Result<Self, QueueError> {
        let ack_deadline = chrono::Duration::from_std(ack_deadline)
            .map_err(|e| QueueError::Transport(format!("ack deadline out of range: {e}")))?;
        Ok(Self {
            pool,
            topic: topic.into(),
            lease_owner: lease_owner.into(),
            ack_deadline,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn receipt(delivery: &Delivery) -> Result<Uuid, QueueError> {
        Uuid::parse_str(&delivery.receipt)
            .map_err(|e| QueueError::Transport(format!("bad receipt {}: {e}", delivery.receipt)))
    }
}

fn transport(e: anyhow::Error) -> QueueError {
    QueueError::Transport(format!("{e:#}"))
}

fn delivery_from_row(row: QueueRow) -> Delivery {
    Delivery {
        receipt: row.message_id.to_string(),
        message: QueueMessage {
            data: row.payload,
            attributes: row.attributes,
        },
        delivery_count: u32::try_from(row.delivery_count).unwrap_or(u32::MAX),
    }
}

#[async_trait]
impl QueuePublisher for PgQueue {
    async fn publish(&self, message: QueueMessage) -> Result<String, QueueError> {
        let id = queue_publish(
            &self.pool,
            &self.topic,
            &message.data,
            &message.attributes,
            Utc::now(),
        )
        .await
        .map_err(|e| QueueError::Publish(format!("{e:#}")))?;
        Ok(id.to_string())
    }
}

#[async_trait]
impl QueueSource for PgQueue {
    async fn receive(&self, max: usize) -> Result<Vec<Delivery>, QueueError> {
        let limit = i64::try_from(max).unwrap_or(i64::MAX);
        let rows = queue_claim_batch(
            &self.pool,
            &self.topic,
            limit,
            &self.lease_owner,
            self.ack_deadline,
            Utc::now(),
        )
        .await
        .map_err(transport)?;
        Ok(rows.into_iter().map(delivery_from_row).collect())
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let id = Self::receipt(delivery)?;
        let deleted = queue_ack(&self.pool, id, &self.lease_owner)
            .await
            .map_err(transport)?;
        if !deleted {
            // Lease expired and the row moved on; the ledger absorbs the redelivery.
            warn!(message_id = %id, "ack found no leased row");
        }
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let id = Self::receipt(delivery)?;
        let released = queue_release(&self.pool, id, &self.lease_owner, Utc::now())
            .await
            .map_err(transport)?;
        if !released {
            warn!(message_id = %id, "nack found no leased row");
        }
        Ok(())
    }
}
