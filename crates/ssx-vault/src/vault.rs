use std::sync::Arc;

use chrono::{DateTime, Utc};
use ssx_db::{CredentialStore, SealedCredential};
use ssx_schemas::{redact_preview, Credential};
use tracing::{info, warn};

use crate::cipher::CredentialCipher;
use crate::refresher::{TokenGrant, TokenRefresher};
use crate::{Unavailable, VaultError};

/// Owns the sealed upstream credential for each realm.
///
/// Concurrent callers may both observe expiry and both refresh; every write
/// is a complete record, so the last writer wins with a valid credential.
pub struct TokenVault {
    store: Arc<dyn CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    cipher: CredentialCipher,
}

impl TokenVault {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
        cipher: CredentialCipher,
    ) -> Self {
        Self {
            store,
            refresher,
            cipher,
        }
    }

    /// Decrypted credential for `realm_id`, refreshed first if expired at `now`.
    pub async fn get_valid_token(
        &self,
        realm_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Credential, VaultError> {
        let current = self.load(realm_id).await?;
        if !current.is_expired(now) {
            return Ok(current);
        }

        info!(
            realm_id,
            expired_at = %current.expires_at(),
            "credential expired; refreshing"
        );
        let grant = self.refresher.refresh(realm_id).await?;
        let next = merge_grant(&current, grant, realm_id, now);
        self.store_sealed(realm_id, &next).await?;
        Ok(next)
    }

    /// Unconditionally refresh and persist.
    pub async fn refresh(
        &self,
        realm_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Credential, VaultError> {
        let current = self.load(realm_id).await?;
        let grant = self.refresher.refresh(realm_id).await?;
        let next = merge_grant(&current, grant, realm_id, now);
        self.store_sealed(realm_id, &next).await?;
        Ok(next)
    }

    /// Seal and store an operator-supplied credential.
    pub async fn seal_initial(
        &self,
        realm_id: &str,
        credential: &Credential,
    ) -> Result<(), VaultError> {
        self.store_sealed(realm_id, credential).await
    }

    /// Stored metadata without decrypting. `None` when nothing is stored.
    pub async fn inspect(&self, realm_id: &str) -> Result<Option<SealedCredential>, VaultError> {
        Ok(self.store.load_credential(realm_id).await?)
    }

    async fn load(&self, realm_id: &str) -> Result<Credential, VaultError> {
        let sealed = self
            .store
            .load_credential(realm_id)
            .await?
            .ok_or_else(|| VaultError::CredentialUnavailable {
                realm_id: realm_id.to_string(),
                reason: Unavailable::Missing,
            })?;

        info!(
            realm_id,
            ciphertext = %redact_preview(&sealed.ciphertext),
            "loaded sealed credential"
        );

        let credential = self.cipher.open(&sealed.ciphertext).map_err(|e| {
            warn!(realm_id, error = %e, "stored credential could not be opened");
            VaultError::CredentialUnavailable {
                realm_id: realm_id.to_string(),
                reason: Unavailable::Undecryptable(e.to_string()),
            }
        })?;

        credential.validate().map_err(|e| {
            warn!(realm_id, error = %e, "stored credential is malformed");
            VaultError::CredentialUnavailable {
                realm_id: realm_id.to_string(),
                reason: Unavailable::Invalid(e.to_string()),
            }
        })?;
        Ok(credential)
    }

    async fn store_sealed(&self, realm_id: &str, credential: &Credential) -> Result<(), VaultError> {
        credential.validate()?;
        let ciphertext = self.cipher.seal(credential)?;
        let sealed = SealedCredential {
            realm_id: realm_id.to_string(),
            ciphertext,
            created_at: credential.created_at,
            expires_in: credential.expires_in,
            x_refresh_token_expires_in: credential.x_refresh_token_expires_in,
        };
        self.store.save_credential(&sealed).await?;
        info!(
            realm_id,
            ciphertext = %redact_preview(&sealed.ciphertext),
            expires_at = %credential.expires_at(),
            "credential sealed"
        );
        Ok(())
    }
}

/// New credential from a refresh grant. Issue time is the vault's clock;
/// refresh metadata the grant omits is kept from `previous`.
fn merge_grant(
    previous: &Credential,
    grant: TokenGrant,
    realm_id: &str,
    now: DateTime<Utc>,
) -> Credential {
    Credential {
        access_token: grant.access_token,
        token_type: grant.token_type,
        created_at: now,
        expires_in: grant.expires_in,
        refresh_token: grant.refresh_token.or_else(|| previous.refresh_token.clone()),
        x_refresh_token_expires_in: grant
            .x_refresh_token_expires_in
            .or(previous.x_refresh_token_expires_in),
        id_token: grant.id_token.or_else(|| previous.id_token.clone()),
        realm_id: previous
            .realm_id
            .clone()
            .or_else(|| Some(realm_id.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn merge_keeps_previous_refresh_metadata() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let prev = Credential {
            access_token: "old".into(),
            token_type: "bearer".into(),
            created_at: t0,
            expires_in: 60,
            refresh_token: Some("RT1-old".into()),
            x_refresh_token_expires_in: Some(100),
            id_token: Some("id".into()),
            realm_id: None,
        };
        let grant = TokenGrant {
            access_token: "new".into(),
            token_type: "bearer".into(),
            expires_in: 3600,
            refresh_token: None,
            x_refresh_token_expires_in: Some(200),
            id_token: None,
        };
        let now = t0 + chrono::Duration::hours(2);
        let next = merge_grant(&prev, grant, "R1", now);
        assert_eq!(next.access_token, "new");
        assert_eq!(next.created_at, now);
        assert_eq!(next.refresh_token.as_deref(), Some("RT1-old"));
        assert_eq!(next.x_refresh_token_expires_in, Some(200));
        assert_eq!(next.id_token.as_deref(), Some("id"));
        assert_eq!(next.realm_id.as_deref(), Some("R1"));
    }
}
