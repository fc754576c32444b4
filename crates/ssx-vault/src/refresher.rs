//! Token refresh against the upstream auth endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use ssx_schemas::{Classify, ErrorClass};

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("auth transport error: {0}")]
    Transport(String),
    #[error("auth endpoint returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("auth response decode error: {0}")]
    Decode(String),
}

impl Classify for RefreshError {
    fn class(&self) -> ErrorClass {
        ErrorClass::TransientNetwork
    }
}

/// Token fields returned by a refresh. Anything absent is carried forward
/// from the previous credential by the vault.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub x_refresh_token_expires_in: Option<i64>,
    #[serde(default)]
    pub id_token: Option<String>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<REDACTED>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("x_refresh_token_expires_in", &self.x_refresh_token_expires_in)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, realm_id: &str) -> Result<TokenGrant, RefreshError>;
}

/// POSTs (no body) to the configured auth URL.
#[derive(Debug, Clone)]
pub struct HttpTokenRefresher {
    http: reqwest::Client,
    url: String,
}

impl HttpTokenRefresher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RefreshError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RefreshError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, realm_id: &str) -> Result<TokenGrant, RefreshError> {
        let resp = self
            .http
            .post(&self.url)
            .query(&[("realm_id", realm_id)])
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .unwrap_or(body);
            return Err(RefreshError::Api {
                status: status.as_u16(),
                message,
            });
        }

        resp.json::<TokenGrant>()
            .await
            .map_err(|e| RefreshError::Decode(e.to_string()))
    }
}
