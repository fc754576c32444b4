use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::time;
use crate::Shipment;

/// Sentinel written when a stale replay carries the status already on file.
pub const CORRUPTED_STATUS: &str = "corrupted";

/// Order status as stored by the ERP.
///
/// On the wire this is a nullable string; `"corrupted"` is reserved for
/// [`OrderStatus::Corrupted`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    /// No status recorded yet.
    Unset,
    /// Tracking status copied from the last applied shipment.
    Tracking(String),
    /// Flagged by the merge as a suspicious same-status stale replay.
    Corrupted,
}

impl OrderStatus {
    pub fn from_shipment_status(status: Option<&str>) -> Self {
        match status {
            None => OrderStatus::Unset,
            Some(CORRUPTED_STATUS) => OrderStatus::Corrupted,
            Some(s) => OrderStatus::Tracking(s.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OrderStatus::Unset => None,
            OrderStatus::Tracking(s) => Some(s.as_str()),
            OrderStatus::Corrupted => Some(CORRUPTED_STATUS),
        }
    }

    /// String-level equality against a shipment status, the way the ERP
    /// compares them.
    pub fn matches(&self, shipment_status: Option<&str>) -> bool {
        self.as_str() == shipment_status
    }

    pub fn is_corrupted(&self) -> bool {
        matches!(self, OrderStatus::Corrupted)
    }
}

impl Serialize for OrderStatus {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self.as_str() {
            Some(v) => s.serialize_str(v),
            None => s.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for OrderStatus {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        Ok(OrderStatus::from_shipment_status(raw.as_deref()))
    }
}

/// ERP order. Mutated only through the conflict merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    #[serde(default = "unset_status")]
    pub status: OrderStatus,
    /// Last applied shipment snapshot, stale replays included.
    #[serde(default)]
    pub shipment: Option<Shipment>,
    #[serde(default, with = "time::serde_utc_opt")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

fn unset_status() -> OrderStatus {
    OrderStatus::Unset
}

impl Order {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: OrderStatus::Unset,
            shipment: None,
            updated_at: None,
            fields: Map::new(),
        }
    }

    /// Timestamp of the last applied snapshot, if any.
    pub fn shipment_last_updated(&self) -> Option<DateTime<Utc>> {
        self.shipment.as_ref().map(|s| s.last_updated)
    }
}
