//! Timer-driven half of the pipeline.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use ssx_db::{CheckpointStore, StoreError};
use ssx_feed::{FeedError, ShipmentFeed};
use ssx_schemas::{Classify, ErrorClass, Shipment};
use ssx_vault::{TokenVault, VaultError};
use tracing::{info, warn};

use crate::message::QueueMessage;
use crate::queue::{QueueError, QueuePublisher};

#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    #[error("checkpoint store: {0}")]
    Checkpoint(#[from] StoreError),

    #[error("credential: {0}")]
    Credential(#[from] VaultError),

    #[error("feed: {0}")]
    Feed(#[from] FeedError),

    #[error("encode shipment {shipment_id}: {source}")]
    Encode {
        shipment_id: String,
        #[source]
        source: serde_json::Error,
    },

    /// At least one publish in the batch was not acknowledged. The
    /// checkpoint was left where it was.
    #[error("{failed} of {attempted} publishes not acknowledged; first: {first}")]
    Unacknowledged {
        attempted: usize,
        failed: usize,
        first: QueueError,
    },
}

impl Classify for ProducerError {
    fn class(&self) -> ErrorClass {
        match self {
            ProducerError::Checkpoint(e) => e.class(),
            ProducerError::Credential(e) => e.class(),
            ProducerError::Feed(e) => e.class(),
            ProducerError::Encode { .. } => ErrorClass::Fatal,
            ProducerError::Unacknowledged { .. } => ErrorClass::TransientNetwork,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerReport {
    pub since: DateTime<Utc>,
    pub fetched: usize,
    pub published: usize,
    pub skipped: usize,
    pub checkpoint_before: DateTime<Utc>,
    pub checkpoint_after: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ProducerSettings {
    pub job_name: String,
    pub realm_id: String,
    /// Checkpoint used when the job has never advanced.
    pub epoch: DateTime<Utc>,
}

/// Poll the feed from the checkpoint, publish one message per shipment and
/// advance the checkpoint only once every publish is acknowledged.
pub struct CheckpointedProducer {
    checkpoints: Arc<dyn CheckpointStore>,
    vault: Arc<TokenVault>,
    feed: Arc<dyn ShipmentFeed>,
    publisher: Arc<dyn QueuePublisher>,
    settings: ProducerSettings,
}

impl CheckpointedProducer {
    pub fn new(
        checkpoints: Arc<dyn CheckpointStore>,
        vault: Arc<TokenVault>,
        feed: Arc<dyn ShipmentFeed>,
        publisher: Arc<dyn QueuePublisher>,
        settings: ProducerSettings,
    ) -> Self {
        Self {
            checkpoints,
            vault,
            feed,
            publisher,
            settings,
        }
    }

    pub fn settings(&self) -> &ProducerSettings {
        &self.settings
    }

    pub async fn run(&self, now: DateTime<Utc>) -> Result<ProducerReport, ProducerError> {
        let job = self.settings.job_name.as_str();
        let since = self
            .checkpoints
            .load_checkpoint(job)
            .await?
            .map(|c| c.last_updated)
            .unwrap_or(self.settings.epoch);

        let credential = self
            .vault
            .get_valid_token(&self.settings.realm_id, now)
            .await?;
        let records = self.feed.list(Some(since), &credential).await?;
        let fetched = records.len();

        let mut shipments: Vec<Shipment> = Vec::with_capacity(fetched);
        for record in &records {
            match record.validate() {
                Ok(s) => shipments.push(s),
                Err(rejection) => {
                    warn!(job, reason = %rejection, "skipping shipment record");
                }
            }
        }
        let skipped = fetched - shipments.len();

        if shipments.is_empty() {
            info!(job, %since, fetched, skipped, "no shipments to publish");
            return Ok(ProducerReport {
                since,
                fetched,
                published: 0,
                skipped,
                checkpoint_before: since,
                checkpoint_after: since,
            });
        }

        let mut messages = Vec::with_capacity(shipments.len());
        for s in &shipments {
            let msg = QueueMessage::encode(s).map_err(|source| ProducerError::Encode {
                shipment_id: s.id.clone(),
                source,
            })?;
            messages.push(msg);
        }

        let attempted = messages.len();
        let results = join_all(messages.into_iter().map(|m| self.publisher.publish(m))).await;

        let mut failures = Vec::new();
        for (s, r) in shipments.iter().zip(results) {
            if let Err(e) = r {
                warn!(job, shipment_id = %s.id, error = %e, "publish not acknowledged");
                failures.push(e);
            }
        }
        let failed = failures.len();
        if let Some(first) = failures.into_iter().next() {
            warn!(job, %since, attempted, failed, "aborting run; checkpoint not advanced");
            return Err(ProducerError::Unacknowledged {
                attempted,
                failed,
                first,
            });
        }

        // Non-empty: checked above.
        let max_seen = shipments
            .iter()
            .map(|s| s.last_updated)
            .max()
            .unwrap_or(since);
        let stored = self.checkpoints.advance_checkpoint(job, max_seen).await?;

        info!(
            job,
            %since,
            fetched,
            published = attempted,
            skipped,
            checkpoint = %stored.last_updated,
            "producer run complete"
        );

        Ok(ProducerReport {
            since,
            fetched,
            published: attempted,
            skipped,
            checkpoint_before: since,
            checkpoint_after: stored.last_updated,
        })
    }
}
