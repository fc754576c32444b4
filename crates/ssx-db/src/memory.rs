//! In-memory backend.
//!
//! Same contract as [`crate::PgStore`]; every operation runs under one mutex
//! so the claim and the checkpoint advance stay atomic. Used by tests and by
//! the daemon when no database URL is configured.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ssx_schemas::{Checkpoint, EventKey, Order, ProcessingRecord, ProcessingStatus};

use crate::store::{
    refused, CheckpointStore, ClaimOutcome, ClaimRequest, CredentialStore, OrderStore,
    ProcessingLedger, SealedCredential, StoreError, StoreResult,
};

#[derive(Default)]
struct Inner {
    checkpoints: BTreeMap<String, Checkpoint>,
    credentials: BTreeMap<String, SealedCredential>,
    records: BTreeMap<EventKey, ProcessingRecord>,
    orders: BTreeMap<String, Order>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with `orders`.
    pub fn with_orders(orders: impl IntoIterator<Item = Order>) -> Self {
        let store = Self::new();
        if let Ok(mut g) = store.inner.lock() {
            for o in orders {
                g.orders.insert(o.id.clone(), o);
            }
        }
        store
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn load_checkpoint(&self, job: &str) -> StoreResult<Option<Checkpoint>> {
        Ok(self.lock()?.checkpoints.get(job).cloned())
    }

    async fn advance_checkpoint(
        &self,
        job: &str,
        candidate: DateTime<Utc>,
    ) -> StoreResult<Checkpoint> {
        let mut g = self.lock()?;
        let cp = g
            .checkpoints
            .entry(job.to_string())
            .or_insert_with(|| Checkpoint::new(job, candidate));
        if candidate > cp.last_updated {
            cp.last_updated = candidate;
        }
        Ok(cp.clone())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn load_credential(&self, realm_id: &str) -> StoreResult<Option<SealedCredential>> {
        Ok(self.lock()?.credentials.get(realm_id).cloned())
    }

    async fn save_credential(&self, sealed: &SealedCredential) -> StoreResult<()> {
        self.lock()?
            .credentials
            .insert(sealed.realm_id.clone(), sealed.clone());
        Ok(())
    }
}

#[async_trait]
impl ProcessingLedger for MemoryStore {
    async fn claim(&self, req: &ClaimRequest) -> StoreResult<ClaimOutcome> {
        let mut g = self.lock()?;
        let inner = &mut *g;
        let stale_before = req.stale_before();

        let Some(rec) = inner.records.get_mut(&req.event_key) else {
            inner.records.insert(
                req.event_key.clone(),
                ProcessingRecord {
                    event_key: req.event_key.clone(),
                    shipment_id: req.shipment_id.clone(),
                    shipment_updated_at: req.shipment_updated_at,
                    status: ProcessingStatus::Processing,
                    retry_count: 1,
                    created_at: req.now,
                    processed_at: None,
                    error: None,
                },
            );
            return Ok(ClaimOutcome::Claimed { retry_count: 1 });
        };

        let reclaimable = match rec.status {
            ProcessingStatus::Failed => true,
            ProcessingStatus::Processing => stale_before.is_some_and(|t| rec.created_at <= t),
            ProcessingStatus::Completed => false,
        };

        if !reclaimable {
            return Ok(match rec.status {
                ProcessingStatus::Completed => ClaimOutcome::AlreadyCompleted,
                _ => ClaimOutcome::InFlight,
            });
        }

        rec.status = ProcessingStatus::Processing;
        rec.retry_count += 1;
        rec.created_at = req.now;
        Ok(ClaimOutcome::Claimed {
            retry_count: rec.retry_count,
        })
    }

    async fn mark_completed(&self, key: &EventKey, at: DateTime<Utc>) -> StoreResult<()> {
        let mut g = self.lock()?;
        let rec = processing_record_mut(&mut g, key, ProcessingStatus::Completed)?;
        rec.status = ProcessingStatus::Completed;
        rec.processed_at = Some(at);
        Ok(())
    }

    async fn mark_failed(&self, key: &EventKey, error: &str, at: DateTime<Utc>) -> StoreResult<()> {
        let mut g = self.lock()?;
        let rec = processing_record_mut(&mut g, key, ProcessingStatus::Failed)?;
        rec.status = ProcessingStatus::Failed;
        rec.processed_at = Some(at);
        rec.error = Some(error.to_string());
        Ok(())
    }

    async fn fetch_record(&self, key: &EventKey) -> StoreResult<Option<ProcessingRecord>> {
        Ok(self.lock()?.records.get(key).cloned())
    }

    async fn list_records(
        &self,
        status: Option<ProcessingStatus>,
        limit: i64,
    ) -> StoreResult<Vec<ProcessingRecord>> {
        let g = self.lock()?;
        let mut out: Vec<ProcessingRecord> = g
            .records
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(limit.max(0) as usize);
        Ok(out)
    }

    async fn reset_processing(
        &self,
        key: &EventKey,
        reason: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut g = self.lock()?;
        match g.records.get_mut(key) {
            Some(rec) if rec.status == ProcessingStatus::Processing => {
                rec.status = ProcessingStatus::Failed;
                rec.processed_at = Some(at);
                rec.error = Some(reason.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

fn processing_record_mut<'a>(
    g: &'a mut Inner,
    key: &EventKey,
    to: ProcessingStatus,
) -> StoreResult<&'a mut ProcessingRecord> {
    let rec = g.records.get_mut(key).ok_or_else(|| StoreError::Missing {
        table: "processing_records",
        key: key.to_string(),
    })?;
    if !rec.status.can_transition_to(to) {
        return Err(refused(key, rec.status, to));
    }
    Ok(rec)
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn fetch_order(&self, order_id: &str) -> StoreResult<Option<Order>> {
        Ok(self.lock()?.orders.get(order_id).cloned())
    }

    async fn save_order(&self, order: &Order) -> StoreResult<()> {
        self.lock()?.orders.insert(order.id.clone(), order.clone());
        Ok(())
    }
}
