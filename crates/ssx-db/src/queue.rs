//! Postgres-backed at-least-once queue.
//!
//! Lifecycle of a row:
//! - `queue_publish` inserts it PENDING and immediately visible.
//! - `queue_claim_batch` leases visible rows (`FOR UPDATE SKIP LOCKED`),
//!   bumps `delivery_count` and hides them until the ack deadline.
//! - `queue_ack` deletes the row. `queue_release` makes it visible again.
//!
//! A lease that is never acked or released simply expires, which is how a
//! crashed consumer's messages get redelivered.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRow {
    pub message_id: Uuid,
    pub topic: String,
    pub payload: Vec<u8>,
    pub attributes: BTreeMap<String, String>,
    pub delivery_count: i32,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDepth {
    pub pending: i64,
    pub leased: i64,
}

pub async fn queue_publish(
    pool: &PgPool,
    topic: &str,
    payload: &[u8],
    attributes: &BTreeMap<String, String>,
    now: DateTime<Utc>,
) -> Result<Uuid> {
    let message_id = Uuid::new_v4();
    let attrs = serde_json::to_value(attributes).context("queue attributes serialize failed")?;

    sqlx::query(
        r#"
        insert into queue_messages (
          message_id, topic, payload, attributes, status, delivery_count, published_at, visible_at
        ) values (
          $1, $2, $3, $4, 'PENDING', 0, $5, $5
        )
        "#,
    )
    .bind(message_id)
    .bind(topic)
    .bind(payload)
    .bind(attrs)
    .bind(now)
    .execute(pool)
    .await
    .context("queue_publish failed")?;

    Ok(message_id)
}

/// Lease up to `limit` visible messages on `topic` for `ack_deadline`.
///
/// Only the consumer driver may lease; the function is compiled in only
/// with the `runtime-claim` feature.
#[cfg(feature = "runtime-claim")]
pub async fn queue_claim_batch(
    pool: &PgPool,
    topic: &str,
    limit: i64,
    lease_owner: &str,
    ack_deadline: chrono::Duration,
    now: DateTime<Utc>,
) -> Result<Vec<QueueRow>> {
    let visible_at = now + ack_deadline;
    let rows = sqlx::query(
        r#"
        with ready as (
          select message_id
          from queue_messages
          where topic = $1
            and visible_at <= $2
          order by published_at asc, message_id asc
          limit $3
          for update skip locked
        )
        update queue_messages q
        set status = 'LEASED',
            lease_owner = $4,
            delivery_count = q.delivery_count + 1,
            visible_at = $5
        from ready
        where q.message_id = ready.message_id
        returning q.message_id, q.topic, q.payload, q.attributes, q.delivery_count, q.published_at
        "#,
    )
    .bind(topic)
    .bind(now)
    .bind(limit)
    .bind(lease_owner)
    .bind(visible_at)
    .fetch_all(pool)
    .await
    .context("queue_claim_batch failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(queue_row(&row)?);
    }
    // UPDATE ... RETURNING does not preserve the CTE order.
    out.sort_by(|a, b| {
        a.published_at
            .cmp(&b.published_at)
            .then(a.message_id.cmp(&b.message_id))
    });
    Ok(out)
}

/// Delete an acknowledged message. Returns false if the row was already gone
/// (acked twice, or leased by someone else after our lease expired and acked).
pub async fn queue_ack(pool: &PgPool, message_id: Uuid, lease_owner: &str) -> Result<bool> {
    let res = sqlx::query(
        r#"
        delete from queue_messages
        where message_id = $1
          and lease_owner = $2
        "#,
    )
    .bind(message_id)
    .bind(lease_owner)
    .execute(pool)
    .await
    .context("queue_ack failed")?;

    Ok(res.rows_affected() == 1)
}

/// Negative ack: make the message visible again at `now`.
pub async fn queue_release(
    pool: &PgPool,
    message_id: Uuid,
    lease_owner: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let res = sqlx::query(
        r#"
        update queue_messages
        set status = 'PENDING',
            lease_owner = null,
            visible_at = $3
        where message_id = $1
          and lease_owner = $2
        "#,
    )
    .bind(message_id)
    .bind(lease_owner)
    .bind(now)
    .execute(pool)
    .await
    .context("queue_release failed")?;

    Ok(res.rows_affected() == 1)
}

pub async fn queue_depth(pool: &PgPool, topic: &str) -> Result<QueueDepth> {
    let (pending, leased): (i64, i64) = sqlx::query_as(
        r#"
        select
          count(*) filter (where status = 'PENDING')::bigint,
          count(*) filter (where status = 'LEASED')::bigint
        from queue_messages
        where topic = $1
        "#,
    )
    .bind(topic)
    .fetch_one(pool)
    .await
    .context("queue_depth failed")?;

    Ok(QueueDepth { pending, leased })
}

#[cfg_attr(not(feature = "runtime-claim"), allow(dead_code))]
fn queue_row(row: &sqlx::postgres::PgRow) -> Result<QueueRow> {
    let attrs: Value = row.try_get("attributes").context("queue attributes column")?;
    let attributes: BTreeMap<String, String> =
        serde_json::from_value(attrs).context("queue attributes are not a string map")?;
    Ok(QueueRow {
        message_id: row.try_get("message_id").context("queue message_id column")?,
        topic: row.try_get("topic").context("queue topic column")?,
        payload: row.try_get("payload").context("queue payload column")?,
        attributes,
        delivery_count: row.try_get("delivery_count").context("queue delivery_count column")?,
        published_at: row.try_get("published_at").context("queue published_at column")?,
    })
}
