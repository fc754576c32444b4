//! ssx-vault
//!
//! Lifecycle of the upstream API credential: sealed at rest with AES-256-GCM,
//! opened only transiently, refreshed when expired.

mod cipher;
mod refresher;
mod vault;

pub use cipher::{CipherError, CredentialCipher};
pub use refresher::{HttpTokenRefresher, RefreshError, TokenGrant, TokenRefresher};
pub use vault::TokenVault;

use ssx_db::StoreError;
use ssx_schemas::{Classify, ErrorClass, MalformedCredential};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unavailable {
    Missing,
    Undecryptable(String),
    /// Opened fine but fails [`Credential::validate`](ssx_schemas::Credential::validate).
    Invalid(String),
}

impl std::fmt::Display for Unavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unavailable::Missing => f.write_str("no stored credential"),
            Unavailable::Undecryptable(e) => write!(f, "stored credential unreadable: {e}"),
            Unavailable::Invalid(e) => write!(f, "stored credential invalid: {e}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("credential unavailable for realm {realm_id}: {reason}")]
    CredentialUnavailable {
        realm_id: String,
        reason: Unavailable,
    },

    /// Sealing a structurally invalid credential. A caller bug, never retried.
    #[error(transparent)]
    Malformed(#[from] MalformedCredential),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error("token refresh failed: {0}")]
    Refresh(#[from] RefreshError),

    #[error("credential store: {0}")]
    Store(#[from] StoreError),
}

impl Classify for VaultError {
    fn class(&self) -> ErrorClass {
        match self {
            VaultError::CredentialUnavailable {
                reason: Unavailable::Missing,
                ..
            } => ErrorClass::NotFound,
            VaultError::CredentialUnavailable { .. }
            | VaultError::Malformed(_)
            | VaultError::Cipher(_) => ErrorClass::Fatal,
            VaultError::Refresh(e) => e.class(),
            VaultError::Store(e) => e.class(),
        }
    }
}
