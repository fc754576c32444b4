use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::time::{self, InvalidTimestamp};
use crate::EventKey;

/// Validated, immutable shipment snapshot. One per event.
///
/// `last_updated` is normalized to UTC on the way in. Provider fields the
/// pipeline does not interpret are carried verbatim in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(with = "time::serde_utc")]
    pub last_updated: DateTime<Utc>,
    /// ERP order this shipment belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Shipment {
    pub fn event_key(&self) -> EventKey {
        EventKey::derive(&self.id, &self.last_updated)
    }
}

/// Why a raw feed record could not become a [`Shipment`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShipmentRejection {
    #[error("shipment record has no id")]
    MissingId,
    #[error("shipment {id} has no last_updated")]
    MissingTimestamp { id: String },
    #[error("shipment {id}: {source}")]
    BadTimestamp {
        id: String,
        #[source]
        source: InvalidTimestamp,
    },
}

/// A shipment exactly as the upstream feed returned it. Nothing is trusted yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShipmentRecord(pub Map<String, Value>);

impl ShipmentRecord {
    /// Provider ids may arrive as strings or numbers; numbers keep their
    /// JSON rendering (`1042`).
    pub fn id(&self) -> Option<String> {
        self.0.get("id").and_then(scalar_text)
    }

    pub fn raw_last_updated(&self) -> Option<&str> {
        self.0.get("last_updated").and_then(Value::as_str)
    }

    pub fn last_updated(&self) -> Option<Result<DateTime<Utc>, InvalidTimestamp>> {
        self.raw_last_updated().map(time::parse_timestamp)
    }

    /// Promote to a [`Shipment`], requiring an id and a parsable timestamp.
    pub fn validate(&self) -> Result<Shipment, ShipmentRejection> {
        let id = self.id().ok_or(ShipmentRejection::MissingId)?;
        let last_updated = match self.last_updated() {
            None => return Err(ShipmentRejection::MissingTimestamp { id }),
            Some(Err(source)) => return Err(ShipmentRejection::BadTimestamp { id, source }),
            Some(Ok(ts)) => ts,
        };

        let mut fields = self.0.clone();
        fields.remove("id");
        fields.remove("last_updated");
        let status = match fields.remove("status") {
            Some(Value::String(s)) => Some(s),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        let order_id = fields.remove("order_id").as_ref().and_then(scalar_text);

        Ok(Shipment {
            id,
            status,
            last_updated,
            order_id,
            fields,
        })
    }
}

fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl From<Map<String, Value>> for ShipmentRecord {
    fn from(m: Map<String, Value>) -> Self {
        Self(m)
    }
}
