//! Queue message codec.
//!
//! Payload: the JSON-encoded shipment snapshot. Attributes: `shipment_id`
//! and `updated_at`, so a transport can route or inspect a message without
//! decoding it.

use std::collections::BTreeMap;

use ssx_schemas::{format_timestamp, Shipment};

pub const ATTR_SHIPMENT_ID: &str = "shipment_id";
pub const ATTR_UPDATED_AT: &str = "updated_at";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub data: Vec<u8>,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not a shipment: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("payload shipment id is empty")]
    EmptyId,
}

impl QueueMessage {
    pub fn encode(shipment: &Shipment) -> Result<Self, serde_json::Error> {
        let data = serde_json::to_vec(shipment)?;
        let mut attributes = BTreeMap::new();
        attributes.insert(ATTR_SHIPMENT_ID.to_string(), shipment.id.clone());
        attributes.insert(
            ATTR_UPDATED_AT.to_string(),
            format_timestamp(&shipment.last_updated),
        );
        Ok(Self { data, attributes })
    }

    pub fn decode(&self) -> Result<Shipment, DecodeError> {
        let shipment: Shipment = serde_json::from_slice(&self.data)?;
        if shipment.id.trim().is_empty() {
            return Err(DecodeError::EmptyId);
        }
        Ok(shipment)
    }

    pub fn shipment_id_hint(&self) -> Option<&str> {
        self.attributes.get(ATTR_SHIPMENT_ID).map(String::as_str)
    }
}
