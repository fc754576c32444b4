use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use ssx_schemas::{format_timestamp, Credential, ShipmentRecord};
use tracing::debug;

use crate::{FeedError, ShipmentFeed};

/// Client for `GET <base>/api/v1/shipments/?last_updated=<ISO-8601>`.
#[derive(Debug, Clone)]
pub struct HttpShipmentFeed {
    http: reqwest::Client,
    base_url: String,
}

impl HttpShipmentFeed {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FeedError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    fn build_shipments_url(&self) -> String {
        format!("{}/api/v1/shipments/", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Deserialize)]
struct ShipmentsResponse {
    #[serde(default)]
    data: Vec<ShipmentRecord>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl ShipmentFeed for HttpShipmentFeed {
    async fn list(
        &self,
        since: Option<DateTime<Utc>>,
        credential: &Credential,
    ) -> Result<Vec<ShipmentRecord>, FeedError> {
        let Some(since) = since else {
            return Ok(Vec::new());
        };
        let since_s = format_timestamp(&since);

        let resp = self
            .http
            .get(self.build_shipments_url())
            .query(&[("last_updated", since_s.as_str())])
            .header(reqwest::header::AUTHORIZATION, credential.authorization_header())
            .send()
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .unwrap_or(body);
            return Err(FeedError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: ShipmentsResponse = resp
            .json()
            .await
            .map_err(|e| FeedError::Decode(e.to_string()))?;
        debug!(since = %since_s, count = body.data.len(), "feed page received");
        Ok(body.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use httpmock::prelude::*;
    use serde_json::json;

    fn credential() -> Credential {
        Credential {
            access_token: "eyJ-feed".into(),
            token_type: "bearer".into(),
            created_at: Utc::now(),
            expires_in: 3600,
            refresh_token: None,
            x_refresh_token_expires_in: None,
            id_token: None,
            realm_id: None,
        }
    }

    #[tokio::test]
    async fn list_sends_since_and_authorization() {
        let server = MockServer::start_async().await;
        let m = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v1/shipments/")
                    .query_param("last_updated", "2024-03-01T10:00:00.000Z")
                    .header("authorization", "bearer eyJ-feed");
                then.status(200).json_body(json!({
                    "data": [
                        {"id": "SHP-1", "status": "SHIPPED", "last_updated": "2024-03-01T10:00:00Z"},
                        {"status": "LOST", "last_updated": "2024-03-01T11:00:00Z"}
                    ]
                }));
            })
            .await;

        let feed = HttpShipmentFeed::new(server.base_url(), Duration::from_secs(5)).unwrap();
        let since = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let got = feed.list(Some(since), &credential()).await.unwrap();
        m.assert_async().await;

        assert_eq!(got.len(), 2);
        assert_eq!(got[0].id().as_deref(), Some("SHP-1"));
        assert_eq!(got[1].id(), None);
    }

    #[tokio::test]
    async fn absent_since_makes_no_request() {
        let server = MockServer::start_async().await;
        let m = server
            .mock_async(|when, then| {
                when.method(GET);
                then.status(500);
            })
            .await;

        let feed = HttpShipmentFeed::new(server.base_url(), Duration::from_secs(5)).unwrap();
        assert!(feed.list(None, &credential()).await.unwrap().is_empty());
        m.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn error_status_carries_body_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/shipments/");
                then.status(400).json_body(json!({
                    "error": "Invalid date format. Use ISO 8601 (e.g., 2024-01-01T00:00:00Z)"
                }));
            })
            .await;

        let feed = HttpShipmentFeed::new(server.base_url(), Duration::from_secs(5)).unwrap();
        let err = feed.list(Some(Utc::now()), &credential()).await.unwrap_err();
        match err {
            FeedError::Api { status, message } => {
                assert_eq!(status, 400);
                assert!(message.starts_with("Invalid date format"));
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }
}
