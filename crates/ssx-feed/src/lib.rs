//! ssx-feed
//!
//! Read side of the upstream logistics provider: "every shipment updated at
//! or after `since`". The HTTP client is what the producer polls; the
//! in-memory catalog serves the same query from a fixture.

mod catalog;
mod filter;
mod http;

pub use catalog::ShipmentCatalog;
pub use filter::filter_since;
pub use http::HttpShipmentFeed;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ssx_schemas::{Classify, Credential, ErrorClass, InvalidTimestamp, ShipmentRecord};

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("feed transport error: {0}")]
    Transport(String),
    #[error("feed returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("feed response decode error: {0}")]
    Decode(String),
    #[error(transparent)]
    InvalidTimestamp(#[from] InvalidTimestamp),
}

impl Classify for FeedError {
    fn class(&self) -> ErrorClass {
        match self {
            FeedError::InvalidTimestamp(_) => ErrorClass::InvalidInput,
            FeedError::Transport(_) | FeedError::Api { .. } | FeedError::Decode(_) => {
                ErrorClass::TransientNetwork
            }
        }
    }
}

/// Shipments with `last_updated >= since`, as raw provider records.
///
/// `since = None` yields an empty list. Records are returned unvalidated:
/// the caller decides what to do with ones missing an id or timestamp.
#[async_trait]
pub trait ShipmentFeed: Send + Sync {
    async fn list(
        &self,
        since: Option<DateTime<Utc>>,
        credential: &Credential,
    ) -> Result<Vec<ShipmentRecord>, FeedError>;
}
