//! Idempotency ledger types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time;

/// Idempotency key for one shipment update: `<shipment_id>-<epoch millis>`.
///
/// Redelivered duplicates of the same (id, last_updated) pair always derive
/// the same key; two updates of one shipment never do.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventKey(String);

impl EventKey {
    pub fn derive(shipment_id: &str, last_updated: &DateTime<Utc>) -> Self {
        EventKey(format!("{}-{}", shipment_id, last_updated.timestamp_millis()))
    }

    /// Wrap a key read back from storage or typed by an operator.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        EventKey(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Processing => "PROCESSING",
            ProcessingStatus::Completed => "COMPLETED",
            ProcessingStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PROCESSING" => Some(ProcessingStatus::Processing),
            "COMPLETED" => Some(ProcessingStatus::Completed),
            "FAILED" => Some(ProcessingStatus::Failed),
            _ => None,
        }
    }

    /// Allowed ledger transitions:
    /// PROCESSING -> COMPLETED | FAILED, FAILED -> PROCESSING.
    /// COMPLETED is terminal.
    pub fn can_transition_to(&self, next: ProcessingStatus) -> bool {
        use ProcessingStatus::*;
        matches!(
            (self, next),
            (Processing, Completed) | (Processing, Failed) | (Failed, Processing)
        )
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingRecord {
    pub event_key: EventKey,
    pub shipment_id: String,
    #[serde(with = "time::serde_utc")]
    pub shipment_updated_at: DateTime<Utc>,
    pub status: ProcessingStatus,
    pub retry_count: i32,
    /// Time of the most recent claim.
    #[serde(with = "time::serde_utc")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "time::serde_utc_opt")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
}
