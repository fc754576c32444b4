//! `ssx produce`, `ssx consume`, `ssx queue depth`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use ssx_db::PgStore;
use ssx_erp::{ConflictMergeSink, HttpErpSink, ShipmentSink};
use ssx_feed::HttpShipmentFeed;
use ssx_runtime::{
    process_batch, run_consumer_loop, run_producer_on_schedule, CheckpointedProducer,
    IdempotentConsumer, PgQueue, ProducerSettings,
};
use tracing::info;
use uuid::Uuid;

use super::{build_vault, ctrl_c, load_wiring, pg_store, Wiring};

/// Where `consume` applies shipments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SinkKind {
    /// POST to the ERP update endpoint (erp.base_url).
    Http,
    /// Merge directly into the orders table.
    Merge,
}

fn pg_queue(store: &PgStore, w: &Wiring, role: &str) -> Result<PgQueue> {
    let owner = format!("{role}-{}", Uuid::new_v4());
    Ok(PgQueue::new(
        store.pool().clone(),
        &w.settings.queue_topic,
        owner,
        w.settings.queue_ack_deadline,
    )?)
}

pub async fn produce(paths: &[String], once: bool, interval_secs: Option<u64>) -> Result<()> {
    let w = load_wiring(paths)?;
    let store = pg_store().await?;
    let vault = Arc::new(build_vault(store.clone(), &w)?);
    let feed = Arc::new(HttpShipmentFeed::new(
        &w.settings.feed_base_url,
        w.settings.http_timeout,
    )?);
    let queue = Arc::new(pg_queue(&store, &w, "producer")?);

    let producer = CheckpointedProducer::new(
        store,
        vault,
        feed,
        queue,
        ProducerSettings {
            job_name: w.settings.job_name.clone(),
            realm_id: w.settings.realm_id.clone(),
            epoch: w.settings.checkpoint_epoch,
        },
    );

    println!("config_hash={}", w.loaded.config_hash);
    if once {
        let r = producer.run(Utc::now()).await?;
        println!("since={}", ssx_schemas::format_timestamp(&r.since));
        println!("fetched={}", r.fetched);
        println!("published={}", r.published);
        println!("skipped={}", r.skipped);
        println!(
            "checkpoint_after={}",
            ssx_schemas::format_timestamp(&r.checkpoint_after)
        );
        return Ok(());
    }

    let interval = interval_secs
        .map(Duration::from_secs)
        .unwrap_or(w.settings.poll_interval);
    info!(job = %w.settings.job_name, interval_secs = interval.as_secs(), "producer scheduled");
    let runs = run_producer_on_schedule(&producer, interval, ctrl_c()).await;
    println!("runs={runs}");
    Ok(())
}

pub async fn consume(paths: &[String], once: bool, sink_kind: SinkKind) -> Result<()> {
    let w = load_wiring(paths)?;
    let store = pg_store().await?;
    let queue = pg_queue(&store, &w, "consumer")?;

    let sink: Arc<dyn ShipmentSink> = match sink_kind {
        SinkKind::Http => Arc::new(HttpErpSink::new(
            &w.settings.erp_base_url,
            w.secrets.require_erp_api_key()?,
            w.settings.http_timeout,
        )?),
        SinkKind::Merge => Arc::new(ConflictMergeSink::new(store.clone())),
    };
    let consumer = IdempotentConsumer::new(store, sink)
        .with_processing_lease(w.settings.processing_lease);
    let batch = usize::try_from(w.settings.queue_batch_size).context("queue.batch_size")?;

    println!("config_hash={}", w.loaded.config_hash);
    let stats = if once {
        process_batch(&consumer, &queue, batch).await?
    } else {
        info!(topic = %w.settings.queue_topic, batch, "consumer started");
        run_consumer_loop(&consumer, &queue, batch, w.settings.queue_idle_wait, ctrl_c()).await
    };
    println!("received={}", stats.received);
    println!("applied={}", stats.applied);
    println!("skipped={}", stats.skipped);
    println!("dropped={}", stats.dropped);
    println!("failed={}", stats.failed);
    Ok(())
}

pub async fn queue_depth(paths: &[String]) -> Result<()> {
    let w = load_wiring(paths)?;
    let store = pg_store().await?;
    let d = ssx_db::queue_depth(store.pool(), &w.settings.queue_topic).await?;
    println!("topic={}", w.settings.queue_topic);
    println!("pending={}", d.pending);
    println!("leased={}", d.leased);
    Ok(())
}
