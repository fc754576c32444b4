use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use ssx_schemas::{Credential, ShipmentRecord};

use crate::{filter_since, FeedError, ShipmentFeed};

/// Shipments held in memory, queried with [`filter_since`].
///
/// Backs the daemon's feed endpoint and stands in for the provider in tests.
#[derive(Debug, Default)]
pub struct ShipmentCatalog {
    records: RwLock<Vec<ShipmentRecord>>,
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    shipments: Vec<ShipmentRecord>,
}

impl ShipmentCatalog {
    pub fn new(records: Vec<ShipmentRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Load `{"shipments": [...]}` from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, FeedError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| FeedError::Decode(format!("read {}: {e}", path.display())))?;
        let file: CatalogFile = serde_json::from_str(&raw)
            .map_err(|e| FeedError::Decode(format!("parse {}: {e}", path.display())))?;
        Ok(Self::new(file.shipments))
    }

    /// Insert, replacing any record with the same id.
    pub fn upsert(&self, record: ShipmentRecord) {
        if let Ok(mut g) = self.records.write() {
            match record.id() {
                Some(id) => {
                    g.retain(|r| r.id().as_deref() != Some(id.as_str()));
                    g.push(record);
                }
                None => g.push(record),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn records_since(&self, since: Option<DateTime<Utc>>) -> Vec<ShipmentRecord> {
        match self.records.read() {
            Ok(g) => filter_since(&g, since),
            Err(_) => Vec::new(),
        }
    }
}

#[async_trait]
impl ShipmentFeed for ShipmentCatalog {
    async fn list(
        &self,
        since: Option<DateTime<Utc>>,
        _credential: &Credential,
    ) -> Result<Vec<ShipmentRecord>, FeedError> {
        Ok(self.records_since(since))
    }
}
