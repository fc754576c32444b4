//! In-process doubles for the sync pipeline.
//!
//! Everything here is deterministic and IO-free: an at-least-once queue with
//! explicit redelivery, a feed that records the `since` it was asked for, a
//! sink that counts applies and can be told to fail, and a vault seeded with
//! a live credential. Scenario tests under `tests/` wire these around the
//! real producer, consumer and merge code.

mod fakes;
mod queue;

pub use fakes::{CountingSink, ScriptedFeed, StaticRefresher};
pub use queue::InMemoryQueue;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Map, Value};
use ssx_db::MemoryStore;
use ssx_erp::ConflictMergeSink;
use ssx_runtime::{
    process_batch, CheckpointedProducer, ConsumerStats, IdempotentConsumer, ProducerSettings,
};
use ssx_schemas::{format_timestamp, Credential, Order, OrderStatus, Shipment, ShipmentRecord};
use ssx_vault::{CredentialCipher, TokenVault};

pub const TEST_REALM: &str = "123189227149329";

/// Fixed instant used as "T" across scenarios: 2024-03-01T10:00:00Z.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

pub fn shipment(id: &str, order_id: &str, status: &str, last_updated: DateTime<Utc>) -> Shipment {
    Shipment {
        id: id.to_string(),
        status: Some(status.to_string()),
        last_updated,
        order_id: Some(order_id.to_string()),
        fields: Map::new(),
    }
}

/// Raw feed record for `shipment`, as the provider would return it.
pub fn record(shipment: &Shipment) -> ShipmentRecord {
    let mut m = shipment.fields.clone();
    m.insert("id".into(), json!(shipment.id));
    m.insert("last_updated".into(), json!(format_timestamp(&shipment.last_updated)));
    if let Some(s) = &shipment.status {
        m.insert("status".into(), json!(s));
    }
    if let Some(o) = &shipment.order_id {
        m.insert("order_id".into(), json!(o));
    }
    ShipmentRecord(m)
}

/// Raw record built from arbitrary JSON, for malformed-input cases.
pub fn raw_record(value: Value) -> ShipmentRecord {
    match value {
        Value::Object(m) => ShipmentRecord(m),
        _ => ShipmentRecord::default(),
    }
}

/// Order whose last applied shipment is `applied`.
pub fn order_with(applied: &Shipment) -> Order {
    let mut o = Order::new(applied.order_id.clone().unwrap_or_default());
    o.status = OrderStatus::from_shipment_status(applied.status.as_deref());
    o.shipment = Some(applied.clone());
    o.updated_at = Some(applied.last_updated);
    o
}

pub fn credential(created_at: DateTime<Utc>, expires_in: i64) -> Credential {
    Credential {
        access_token: "eyJ-testkit-access".into(),
        token_type: "bearer".into(),
        created_at,
        expires_in,
        refresh_token: Some("RT1-testkit".into()),
        x_refresh_token_expires_in: Some(8_726_400),
        id_token: None,
        realm_id: Some(TEST_REALM.into()),
    }
}

/// Vault over `store` holding `credential` for [`TEST_REALM`], refreshing
/// through `refresher`.
pub async fn seeded_vault(
    store: Arc<MemoryStore>,
    refresher: Arc<StaticRefresher>,
    credential: &Credential,
) -> Result<Arc<TokenVault>> {
    let cipher = CredentialCipher::from_key(&[0x42u8; 32]).context("test cipher")?;
    let vault = TokenVault::new(store, refresher, cipher);
    vault
        .seal_initial(TEST_REALM, credential)
        .await
        .context("seal test credential")?;
    Ok(Arc::new(vault))
}

/// The full pipeline wired over in-memory doubles.
pub struct Pipeline {
    pub store: Arc<MemoryStore>,
    pub queue: Arc<InMemoryQueue>,
    pub feed: Arc<ScriptedFeed>,
    pub sink: Arc<CountingSink>,
    pub refresher: Arc<StaticRefresher>,
    pub producer: CheckpointedProducer,
    pub consumer: IdempotentConsumer,
}

pub const TEST_JOB: &str = "order-status-update-producer";

impl Pipeline {
    /// Orders seeded into the store, records served by the feed, and a
    /// credential issued at `issued_at` valid for one hour.
    pub async fn new(
        orders: Vec<Order>,
        records: Vec<ShipmentRecord>,
        issued_at: DateTime<Utc>,
    ) -> Result<Self> {
        let store = Arc::new(MemoryStore::with_orders(orders));
        let queue = Arc::new(InMemoryQueue::new());
        let feed = Arc::new(ScriptedFeed::new(records));
        let sink = Arc::new(CountingSink::new(Arc::new(ConflictMergeSink::new(
            store.clone(),
        ))));
        let refresher = Arc::new(StaticRefresher::new("eyJ-refreshed-access", 3600));
        let vault = seeded_vault(store.clone(), refresher.clone(), &credential(issued_at, 3600))
            .await?;

        let producer = CheckpointedProducer::new(
            store.clone(),
            vault,
            feed.clone(),
            queue.clone(),
            ProducerSettings {
                job_name: TEST_JOB.to_string(),
                realm_id: TEST_REALM.to_string(),
                epoch: DateTime::<Utc>::UNIX_EPOCH,
            },
        );
        let consumer = IdempotentConsumer::new(store.clone(), sink.clone());

        Ok(Self {
            store,
            queue,
            feed,
            sink,
            refresher,
            producer,
            consumer,
        })
    }

    /// One pass over every currently visible message. Messages that fail
    /// are nacked and stay on the queue for the next pass.
    pub async fn drain(&self) -> Result<ConsumerStats> {
        let visible = self.queue.pending_len();
        if visible == 0 {
            return Ok(ConsumerStats::default());
        }
        process_batch(&self.consumer, self.queue.as_ref(), visible)
            .await
            .context("drain batch")
    }
}
