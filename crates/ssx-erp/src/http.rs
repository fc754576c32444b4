use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use ssx_schemas::{Order, Shipment};

use crate::{order_id_of, ShipmentSink, SinkError};

/// Client for `POST <base>/api/v1/orders/{order_id}/shipment/`.
///
/// The API key is resolved by the caller and passed in; never log it.
#[derive(Clone)]
pub struct HttpErpSink {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for HttpErpSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpErpSink")
            .field("base_url", &self.base_url)
            .field("api_key", &"<REDACTED>")
            .finish()
    }
}

impl HttpErpSink {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SinkError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    fn build_shipment_url(&self, order_id: &str) -> String {
        format!(
            "{}/api/v1/orders/{}/shipment/",
            self.base_url.trim_end_matches('/'),
            order_id
        )
    }
}

#[derive(Deserialize)]
struct UpdateResponse {
    data: Order,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl ShipmentSink for HttpErpSink {
    async fn apply(&self, shipment: &Shipment, _now: DateTime<Utc>) -> Result<Order, SinkError> {
        let order_id = order_id_of(shipment)?;

        let resp = self
            .http
            .post(self.build_shipment_url(order_id))
            .bearer_auth(&self.api_key)
            .json(shipment)
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .unwrap_or(body);
            return Err(SinkError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: UpdateResponse = resp
            .json()
            .await
            .map_err(|e| SinkError::Decode(e.to_string()))?;
        Ok(body.data)
    }
}
