//! Upstream API credential.
//!
//! Plaintext only ever lives in memory. `Debug` redacts every token value;
//! use [`redact_preview`] when an operator needs to correlate a value in logs.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed credential: {0}")]
pub struct MalformedCredential(pub &'static str);

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub token_type: String,
    /// Issue time, epoch milliseconds on the wire.
    #[serde(with = "chrono::serde::ts_milliseconds", alias = "createdAt")]
    pub created_at: DateTime<Utc>,
    /// Lifetime in seconds, counted from `created_at`.
    pub expires_in: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_refresh_token_expires_in: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "realmId")]
    pub realm_id: Option<String>,
}

impl Credential {
    /// `None` when `created_at + expires_in` is not a representable instant.
    pub fn checked_expires_at(&self) -> Option<DateTime<Utc>> {
        Duration::try_seconds(self.expires_in).and_then(|d| self.created_at.checked_add_signed(d))
    }

    /// Saturates at the latest representable instant. [`Credential::validate`]
    /// rejects credentials where that would happen.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.checked_expires_at().unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// The expiry instant itself already counts as expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at() <= now
    }

    /// `<token_type> <access_token>`, e.g. `bearer eyJ...`.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }

    /// Structural checks applied before sealing.
    pub fn validate(&self) -> Result<(), MalformedCredential> {
        if self.access_token.trim().is_empty() {
            return Err(MalformedCredential("access_token is empty"));
        }
        if self.token_type.trim().is_empty() {
            return Err(MalformedCredential("token_type is empty"));
        }
        if self.expires_in < 0 {
            return Err(MalformedCredential("expires_in is negative"));
        }
        if self.checked_expires_at().is_none() {
            return Err(MalformedCredential("expires_in overflows the expiry instant"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<REDACTED>")
            .field("token_type", &self.token_type)
            .field("created_at", &self.created_at)
            .field("expires_in", &self.expires_in)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<REDACTED>"),
            )
            .field("x_refresh_token_expires_in", &self.x_refresh_token_expires_in)
            .field("id_token", &self.id_token.as_ref().map(|_| "<REDACTED>"))
            .field("realm_id", &self.realm_id)
            .finish()
    }
}

/// `abcdefgh...stuvwxyz` for long values, `<REDACTED>` for short ones.
pub fn redact_preview(value: &str) -> String {
    const EDGE: usize = 8;
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= EDGE * 3 {
        return "<REDACTED>".to_string();
    }
    let head: String = chars[..EDGE].iter().collect();
    let tail: String = chars[chars.len() - EDGE..].iter().collect();
    format!("{head}...{tail}")
}
