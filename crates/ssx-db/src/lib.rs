//! ssx-db
//!
//! Persistence for the sync pipeline: store traits, the Postgres backend
//! (sqlx, embedded migrations), an in-memory backend with the same
//! semantics, and the Postgres queue table primitives.

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

mod fixtures;
mod memory;
mod pg;
pub mod queue;
pub mod store;

pub use fixtures::{load_orders_fixture, seed_orders};
pub use memory::MemoryStore;
pub use pg::PgStore;
#[cfg(feature = "runtime-claim")]
pub use queue::queue_claim_batch;
pub use queue::{queue_ack, queue_depth, queue_publish, queue_release, QueueDepth, QueueRow};
pub use store::{
    CheckpointStore, ClaimOutcome, ClaimRequest, CredentialStore, OrderStore, ProcessingLedger,
    SealedCredential, StoreError, StoreResult,
};

pub const ENV_DB_URL: &str = "SSX_DATABASE_URL";

/// Connect to Postgres using SSX_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL)
        .with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Connectivity + schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema = 'public' and table_name = 'processing_records'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_ledger_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_ledger_table: bool,
}

/// Ledger records currently PROCESSING. Non-zero means a consumer may be
/// mid-apply. Zero when the ledger table does not exist yet.
pub async fn count_processing(pool: &PgPool) -> Result<i64> {
    if !status(pool).await?.has_ledger_table {
        return Ok(0);
    }
    let (n,): (i64,) = sqlx::query_as::<_, (i64,)>(
        "select count(*)::bigint from processing_records where status = 'PROCESSING'",
    )
    .fetch_one(pool)
    .await
    .context("count_processing failed")?;
    Ok(n)
}
