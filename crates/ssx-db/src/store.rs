//! Store contracts shared by the Postgres and in-memory backends.
//!
//! Every mutation that other components race on is a single conditional
//! write here: the checkpoint only moves forward, and a processing record is
//! claimed by one atomic read-modify-write. Implementations must be
//! `Send + Sync` for use behind `Arc<dyn ...>`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ssx_schemas::{
    Checkpoint, Classify, ErrorClass, EventKey, Order, ProcessingRecord, ProcessingStatus,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt {table} row {key}: {detail}")]
    CorruptRow {
        table: &'static str,
        key: String,
        detail: String,
    },

    #[error("no {table} row for {key}")]
    Missing { table: &'static str, key: String },

    #[error("processing record {event_key}: {from} -> {to} is not allowed")]
    InvalidTransition {
        event_key: EventKey,
        from: ProcessingStatus,
        to: ProcessingStatus,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store lock poisoned")]
    LockPoisoned,
}

impl Classify for StoreError {
    fn class(&self) -> ErrorClass {
        match self {
            StoreError::Database(_) => ErrorClass::TransientNetwork,
            StoreError::Missing { .. } => ErrorClass::NotFound,
            StoreError::InvalidTransition { .. } => ErrorClass::DataConsistency,
            StoreError::CorruptRow { .. } | StoreError::Json(_) | StoreError::LockPoisoned => {
                ErrorClass::Fatal
            }
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// `Ok(None)` when the job has never advanced.
    async fn load_checkpoint(&self, job: &str) -> StoreResult<Option<Checkpoint>>;

    /// Store `max(current, candidate)` and return the stored value.
    async fn advance_checkpoint(
        &self,
        job: &str,
        candidate: DateTime<Utc>,
    ) -> StoreResult<Checkpoint>;
}

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// Encrypted credential plus the clear metadata stored beside it.
#[derive(Clone, PartialEq, Eq)]
pub struct SealedCredential {
    pub realm_id: String,
    /// base64(nonce || ciphertext || tag)
    pub ciphertext: String,
    pub created_at: DateTime<Utc>,
    pub expires_in: i64,
    pub x_refresh_token_expires_in: Option<i64>,
}

impl std::fmt::Debug for SealedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedCredential")
            .field("realm_id", &self.realm_id)
            .field("ciphertext", &ssx_schemas::redact_preview(&self.ciphertext))
            .field("created_at", &self.created_at)
            .field("expires_in", &self.expires_in)
            .field("x_refresh_token_expires_in", &self.x_refresh_token_expires_in)
            .finish()
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load_credential(&self, realm_id: &str) -> StoreResult<Option<SealedCredential>>;

    /// Whole-record upsert. Racing writers: last write wins.
    async fn save_credential(&self, sealed: &SealedCredential) -> StoreResult<()>;
}

// ---------------------------------------------------------------------------
// Processing ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ClaimRequest {
    pub event_key: EventKey,
    pub shipment_id: String,
    pub shipment_updated_at: DateTime<Utc>,
    pub now: DateTime<Utc>,
    /// PROCESSING claims older than this are reclaimable. `None` never expires.
    pub lease: Option<Duration>,
}

impl ClaimRequest {
    /// Claims made at or before the returned instant are stale.
    pub fn stale_before(&self) -> Option<DateTime<Utc>> {
        let lease = chrono::Duration::from_std(self.lease?).ok()?;
        self.now.checked_sub_signed(lease)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This caller owns the event. `retry_count` already includes this claim.
    Claimed { retry_count: i32 },
    AlreadyCompleted,
    /// Another attempt holds a live PROCESSING claim.
    InFlight,
}

#[async_trait]
pub trait ProcessingLedger: Send + Sync {
    /// Atomic claim: absent or FAILED (or lease-expired PROCESSING) becomes
    /// PROCESSING with retry_count + 1. Anything else is left untouched.
    async fn claim(&self, req: &ClaimRequest) -> StoreResult<ClaimOutcome>;

    /// PROCESSING -> COMPLETED.
    async fn mark_completed(&self, key: &EventKey, at: DateTime<Utc>) -> StoreResult<()>;

    /// PROCESSING -> FAILED.
    async fn mark_failed(&self, key: &EventKey, error: &str, at: DateTime<Utc>) -> StoreResult<()>;

    async fn fetch_record(&self, key: &EventKey) -> StoreResult<Option<ProcessingRecord>>;

    /// Newest claims first.
    async fn list_records(
        &self,
        status: Option<ProcessingStatus>,
        limit: i64,
    ) -> StoreResult<Vec<ProcessingRecord>>;

    /// Operator release of an orphaned claim: PROCESSING -> FAILED.
    /// Returns false when the record was not PROCESSING.
    async fn reset_processing(
        &self,
        key: &EventKey,
        reason: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn fetch_order(&self, order_id: &str) -> StoreResult<Option<Order>>;

    async fn save_order(&self, order: &Order) -> StoreResult<()>;
}

/// Error for a transition the ledger refused, built from the row's current status.
pub(crate) fn refused(key: &EventKey, from: ProcessingStatus, to: ProcessingStatus) -> StoreError {
    StoreError::InvalidTransition {
        event_key: key.clone(),
        from,
        to,
    }
}
