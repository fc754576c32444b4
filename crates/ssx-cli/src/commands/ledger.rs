//! `ssx ledger ...`: inspect and repair processing records.

use anyhow::{Context, Result};
use chrono::Utc;
use ssx_db::ProcessingLedger;
use ssx_schemas::{EventKey, ProcessingRecord, ProcessingStatus};

use super::{opt_dt, pg_store};

fn print_record(r: &ProcessingRecord) {
    println!("event_key={}", r.event_key);
    println!("shipment_id={}", r.shipment_id);
    println!(
        "shipment_updated_at={}",
        ssx_schemas::format_timestamp(&r.shipment_updated_at)
    );
    println!("status={}", r.status);
    println!("retry_count={}", r.retry_count);
    println!("created_at={}", ssx_schemas::format_timestamp(&r.created_at));
    println!("processed_at={}", opt_dt(&r.processed_at));
    println!("error={}", r.error.as_deref().unwrap_or("null"));
}

pub fn parse_status(s: &str) -> Result<ProcessingStatus> {
    ProcessingStatus::parse(&s.trim().to_uppercase()).with_context(|| {
        format!("invalid --status '{s}'. expected one of: PROCESSING | COMPLETED | FAILED")
    })
}

pub async fn show(key: &str) -> Result<()> {
    let store = pg_store().await?;
    let key = EventKey::from_raw(key);
    let r = store
        .fetch_record(&key)
        .await?
        .with_context(|| format!("no processing record for {key}"))?;
    print_record(&r);
    Ok(())
}

pub async fn list(status: Option<&str>, limit: i64) -> Result<()> {
    let status = status.map(parse_status).transpose()?;
    let store = pg_store().await?;
    let records = store.list_records(status, limit).await?;
    for r in &records {
        println!(
            "{} status={} retry_count={} processed_at={}",
            r.event_key,
            r.status,
            r.retry_count,
            opt_dt(&r.processed_at)
        );
    }
    println!("count={}", records.len());
    Ok(())
}

/// PROCESSING -> FAILED so the next delivery can reclaim the event.
pub async fn reset(key: &str, reason: &str, yes: bool) -> Result<()> {
    if !yes {
        anyhow::bail!(
            "REFUSING RESET: a PROCESSING record may belong to a live consumer. Re-run with: `ssx ledger reset --key {key} --yes`"
        );
    }
    let store = pg_store().await?;
    let key = EventKey::from_raw(key);
    let reset = store.reset_processing(&key, reason, Utc::now()).await?;
    if !reset {
        anyhow::bail!("no PROCESSING record for {key}; nothing reset");
    }
    println!("reset=true event_key={key} status=FAILED");
    Ok(())
}
