//! Postgres backend.
//!
//! Each trait method is one statement (or one statement plus a read-back for
//! diagnostics). The claim is an `INSERT ... ON CONFLICT DO UPDATE ... WHERE`
//! so two consumers racing on one event key cannot both win.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use ssx_schemas::{Checkpoint, EventKey, Order, ProcessingRecord, ProcessingStatus};

use crate::store::{
    refused, CheckpointStore, ClaimOutcome, ClaimRequest, CredentialStore, OrderStore,
    ProcessingLedger, SealedCredential, StoreError, StoreResult,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn current_status(&self, key: &EventKey) -> StoreResult<Option<ProcessingStatus>> {
        let row: Option<(String,)> =
            sqlx::query_as("select status from processing_records where event_key = $1")
                .bind(key.as_str())
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(s,)| parse_status(key.as_str(), &s)).transpose()
    }

    /// Explain why a guarded PROCESSING -> `to` update touched no row.
    async fn refusal(&self, key: &EventKey, to: ProcessingStatus) -> StoreError {
        match self.current_status(key).await {
            Ok(Some(from)) => refused(key, from, to),
            Ok(None) => StoreError::Missing {
                table: "processing_records",
                key: key.to_string(),
            },
            Err(e) => e,
        }
    }
}

fn parse_status(key: &str, raw: &str) -> StoreResult<ProcessingStatus> {
    ProcessingStatus::parse(raw).ok_or_else(|| StoreError::CorruptRow {
        table: "processing_records",
        key: key.to_string(),
        detail: format!("unknown status {raw:?}"),
    })
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

#[async_trait]
impl CheckpointStore for PgStore {
    async fn load_checkpoint(&self, job: &str) -> StoreResult<Option<Checkpoint>> {
        let row: Option<(DateTime<Utc>,)> =
            sqlx::query_as("select last_updated from checkpoints where job = $1")
                .bind(job)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(ts,)| Checkpoint::new(job, ts)))
    }

    async fn advance_checkpoint(
        &self,
        job: &str,
        candidate: DateTime<Utc>,
    ) -> StoreResult<Checkpoint> {
        let (stored,): (DateTime<Utc>,) = sqlx::query_as(
            r#"
            insert into checkpoints (job, last_updated, updated_at)
            values ($1, $2, now())
            on conflict (job) do update
              set last_updated = greatest(checkpoints.last_updated, excluded.last_updated),
                  updated_at = now()
            returning last_updated
            "#,
        )
        .bind(job)
        .bind(candidate)
        .fetch_one(&self.pool)
        .await?;
        Ok(Checkpoint::new(job, stored))
    }
}

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

#[async_trait]
impl CredentialStore for PgStore {
    async fn load_credential(&self, realm_id: &str) -> StoreResult<Option<SealedCredential>> {
        let row = sqlx::query(
            r#"
            select realm_id, ciphertext, created_at, expires_in, x_refresh_token_expires_in
            from credentials
            where realm_id = $1
            "#,
        )
        .bind(realm_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(SealedCredential {
            realm_id: row.try_get("realm_id")?,
            ciphertext: row.try_get("ciphertext")?,
            created_at: row.try_get("created_at")?,
            expires_in: row.try_get("expires_in")?,
            x_refresh_token_expires_in: row.try_get("x_refresh_token_expires_in")?,
        }))
    }

    async fn save_credential(&self, sealed: &SealedCredential) -> StoreResult<()> {
        sqlx::query(
            r#"
            insert into credentials (
              realm_id, ciphertext, created_at, expires_in, x_refresh_token_expires_in, sealed_at
            ) values ($1, $2, $3, $4, $5, now())
            on conflict (realm_id) do update
              set ciphertext = excluded.ciphertext,
                  created_at = excluded.created_at,
                  expires_in = excluded.expires_in,
                  x_refresh_token_expires_in = excluded.x_refresh_token_expires_in,
                  sealed_at = now()
            "#,
        )
        .bind(&sealed.realm_id)
        .bind(&sealed.ciphertext)
        .bind(sealed.created_at)
        .bind(sealed.expires_in)
        .bind(sealed.x_refresh_token_expires_in)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Processing ledger
// ---------------------------------------------------------------------------

const RECORD_COLUMNS: &str = "event_key, shipment_id, shipment_updated_at, status, retry_count, \
                              created_at, processed_at, error";

fn record_from_row(row: &sqlx::postgres::PgRow) -> StoreResult<ProcessingRecord> {
    let key: String = row.try_get("event_key")?;
    let status: String = row.try_get("status")?;
    Ok(ProcessingRecord {
        status: parse_status(&key, &status)?,
        event_key: EventKey::from_raw(key),
        shipment_id: row.try_get("shipment_id")?,
        shipment_updated_at: row.try_get("shipment_updated_at")?,
        retry_count: row.try_get("retry_count")?,
        created_at: row.try_get("created_at")?,
        processed_at: row.try_get("processed_at")?,
        error: row.try_get("error")?,
    })
}

#[async_trait]
impl ProcessingLedger for PgStore {
    async fn claim(&self, req: &ClaimRequest) -> StoreResult<ClaimOutcome> {
        let claimed: Option<(i32,)> = sqlx::query_as(
            r#"
            insert into processing_records as pr (
              event_key, shipment_id, shipment_updated_at, status, retry_count, created_at
            ) values ($1, $2, $3, 'PROCESSING', 1, $4)
            on conflict (event_key) do update
              set status = 'PROCESSING',
                  retry_count = pr.retry_count + 1,
                  created_at = excluded.created_at
              where pr.status = 'FAILED'
                 or (pr.status = 'PROCESSING'
                     and $5::timestamptz is not null
                     and pr.created_at <= $5::timestamptz)
            returning retry_count
            "#,
        )
        .bind(req.event_key.as_str())
        .bind(&req.shipment_id)
        .bind(req.shipment_updated_at)
        .bind(req.now)
        .bind(req.stale_before())
        .fetch_optional(&self.pool)
        .await?;

        if let Some((retry_count,)) = claimed {
            return Ok(ClaimOutcome::Claimed { retry_count });
        }

        // Lost the claim. Read back only to report why.
        Ok(match self.current_status(&req.event_key).await? {
            Some(ProcessingStatus::Completed) => ClaimOutcome::AlreadyCompleted,
            _ => ClaimOutcome::InFlight,
        })
    }

    async fn mark_completed(&self, key: &EventKey, at: DateTime<Utc>) -> StoreResult<()> {
        let res = sqlx::query(
            r#"
            update processing_records
            set status = 'COMPLETED',
                processed_at = $2
            where event_key = $1
              and status = 'PROCESSING'
            "#,
        )
        .bind(key.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            return Err(self.refusal(key, ProcessingStatus::Completed).await);
        }
        Ok(())
    }

    async fn mark_failed(&self, key: &EventKey, error: &str, at: DateTime<Utc>) -> StoreResult<()> {
        let res = sqlx::query(
            r#"
            update processing_records
            set status = 'FAILED',
                processed_at = $2,
                error = $3
            where event_key = $1
              and status = 'PROCESSING'
            "#,
        )
        .bind(key.as_str())
        .bind(at)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            return Err(self.refusal(key, ProcessingStatus::Failed).await);
        }
        Ok(())
    }

    async fn fetch_record(&self, key: &EventKey) -> StoreResult<Option<ProcessingRecord>> {
        let sql = format!("select {RECORD_COLUMNS} from processing_records where event_key = $1");
        let row = sqlx::query(&sql)
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn list_records(
        &self,
        status: Option<ProcessingStatus>,
        limit: i64,
    ) -> StoreResult<Vec<ProcessingRecord>> {
        let sql = format!(
            r#"
            select {RECORD_COLUMNS}
            from processing_records
            where ($1::text is null or status = $1)
            order by created_at desc, event_key asc
            limit $2
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(status.map(|s| s.as_str()))
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn reset_processing(
        &self,
        key: &EventKey,
        reason: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let res = sqlx::query(
            r#"
            update processing_records
            set status = 'FAILED',
                processed_at = $2,
                error = $3
            where event_key = $1
              and status = 'PROCESSING'
            "#,
        )
        .bind(key.as_str())
        .bind(at)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() == 1)
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[async_trait]
impl OrderStore for PgStore {
    async fn fetch_order(&self, order_id: &str) -> StoreResult<Option<Order>> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("select doc from orders where order_id = $1")
                .bind(order_id)
                .fetch_optional(&self.pool)
                .await?;

        let Some((doc,)) = row else {
            return Ok(None);
        };
        let order: Order = serde_json::from_value(doc).map_err(|e| StoreError::CorruptRow {
            table: "orders",
            key: order_id.to_string(),
            detail: e.to_string(),
        })?;
        Ok(Some(order))
    }

    async fn save_order(&self, order: &Order) -> StoreResult<()> {
        let doc = serde_json::to_value(order)?;
        sqlx::query(
            r#"
            insert into orders (order_id, doc, updated_at)
            values ($1, $2, $3)
            on conflict (order_id) do update
              set doc = excluded.doc,
                  updated_at = excluded.updated_at
            "#,
        )
        .bind(&order.id)
        .bind(doc)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
