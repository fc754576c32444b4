//! ssx-schemas
//!
//! Shared domain types for the shipment synchronization pipeline. This crate
//! owns no IO: stores, clients and drivers live in the crates that depend on it.

pub mod credential;
pub mod error;
pub mod order;
pub mod processing;
pub mod shipment;
pub mod time;

pub use credential::{redact_preview, Credential, MalformedCredential};
pub use error::{Classify, ErrorClass};
pub use order::{Order, OrderStatus, CORRUPTED_STATUS};
pub use processing::{EventKey, ProcessingRecord, ProcessingStatus};
pub use shipment::{Shipment, ShipmentRecord, ShipmentRejection};
pub use time::{format_timestamp, parse_timestamp, InvalidTimestamp};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Producer high-water mark. One row per job name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub job: String,
    #[serde(with = "time::serde_utc")]
    pub last_updated: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(job: impl Into<String>, last_updated: DateTime<Utc>) -> Self {
        Self {
            job: job.into(),
            last_updated,
        }
    }
}
