use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ssx_erp::{ShipmentSink, SinkError};
use ssx_feed::{FeedError, ShipmentCatalog, ShipmentFeed};
use ssx_schemas::{Credential, Order, Shipment, ShipmentRecord};
use ssx_vault::{RefreshError, TokenGrant, TokenRefresher};

/// Feed backed by a [`ShipmentCatalog`] that remembers each `since` it was
/// asked for and the authorization header it was given.
#[derive(Default)]
pub struct ScriptedFeed {
    catalog: ShipmentCatalog,
    calls: Mutex<Vec<(Option<DateTime<Utc>>, String)>>,
    fail_next: AtomicUsize,
}

impl ScriptedFeed {
    pub fn new(records: Vec<ShipmentRecord>) -> Self {
        Self {
            catalog: ShipmentCatalog::new(records),
            ..Self::default()
        }
    }

    pub fn push(&self, record: ShipmentRecord) {
        self.catalog.upsert(record);
    }

    /// The next `n` calls return a transport error.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn sinces(&self) -> Vec<Option<DateTime<Utc>>> {
        self.calls
            .lock()
            .map(|c| c.iter().map(|(s, _)| *s).collect())
            .unwrap_or_default()
    }

    pub fn auth_headers(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|c| c.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ShipmentFeed for ScriptedFeed {
    async fn list(
        &self,
        since: Option<DateTime<Utc>>,
        credential: &Credential,
    ) -> Result<Vec<ShipmentRecord>, FeedError> {
        if let Ok(mut c) = self.calls.lock() {
            c.push((since, credential.authorization_header()));
        }
        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(FeedError::Transport("scripted feed failure".into()));
        }
        self.catalog.list(since, credential).await
    }
}

/// Wraps a real sink, counting every `apply` and optionally failing the
/// next `n` with a transient error before they reach the inner sink.
pub struct CountingSink {
    inner: Arc<dyn ShipmentSink>,
    applies: AtomicUsize,
    fail_next: AtomicUsize,
}

impl CountingSink {
    pub fn new(inner: Arc<dyn ShipmentSink>) -> Self {
        Self {
            inner,
            applies: AtomicUsize::new(0),
            fail_next: AtomicUsize::new(0),
        }
    }

    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Calls that reached this sink, failed ones included.
    pub fn applies(&self) -> usize {
        self.applies.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShipmentSink for CountingSink {
    async fn apply(&self, shipment: &Shipment, now: DateTime<Utc>) -> Result<Order, SinkError> {
        self.applies.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SinkError::Transport("scripted erp timeout".into()));
        }
        self.inner.apply(shipment, now).await
    }
}

/// Refresher that hands out a fixed grant and counts calls.
pub struct StaticRefresher {
    grant: TokenGrant,
    calls: AtomicUsize,
}

impl StaticRefresher {
    pub fn new(access_token: &str, expires_in: i64) -> Self {
        Self {
            grant: TokenGrant {
                access_token: access_token.to_string(),
                token_type: "bearer".into(),
                expires_in,
                refresh_token: None,
                x_refresh_token_expires_in: None,
                id_token: None,
            },
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenRefresher for StaticRefresher {
    async fn refresh(&self, _realm_id: &str) -> Result<TokenGrant, RefreshError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.grant.clone())
    }
}
