//! `ssx vault ...`: sealing key generation, initial credential sealing and
//! a redacted token check. Plaintext tokens are never printed.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use ssx_schemas::{redact_preview, Credential};
use ssx_vault::CredentialCipher;

use super::{build_vault, load_wiring, pg_store};

pub fn keygen() {
    println!("secret_key={}", CredentialCipher::generate_key());
}

/// Read an operator-supplied credential JSON file (as issued by the auth
/// provider; `createdAt`/`realmId` spellings accepted).
pub fn read_credential(path: &Path) -> Result<Credential> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read credential file failed: {}", path.display()))?;
    let credential: Credential = serde_json::from_str(raw.trim())
        .with_context(|| format!("credential file is not a valid credential: {}", path.display()))?;
    credential.validate()?;
    Ok(credential)
}

pub async fn seal(paths: &[String], file: &Path) -> Result<()> {
    let w = load_wiring(paths)?;
    let credential = read_credential(file)?;
    let realm_id = credential
        .realm_id
        .clone()
        .unwrap_or_else(|| w.settings.realm_id.clone());

    let store = pg_store().await?;
    let vault = build_vault(store, &w)?;
    vault.seal_initial(&realm_id, &credential).await?;

    println!("sealed=true realm_id={realm_id}");
    println!("expires_at={}", ssx_schemas::format_timestamp(&credential.expires_at()));
    Ok(())
}

pub async fn token(paths: &[String], force_refresh: bool) -> Result<()> {
    let w = load_wiring(paths)?;
    let realm_id = w.settings.realm_id.clone();
    let store = pg_store().await?;
    let vault = build_vault(store, &w)?;

    let now = Utc::now();
    let credential = if force_refresh {
        vault.refresh(&realm_id, now).await?
    } else {
        vault.get_valid_token(&realm_id, now).await?
    };

    println!("realm_id={realm_id}");
    println!("token_type={}", credential.token_type);
    println!("access_token={}", redact_preview(&credential.access_token));
    println!("expires_at={}", ssx_schemas::format_timestamp(&credential.expires_at()));
    println!("expired={}", credential.is_expired(now));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_provider_shaped_credential_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(
            &path,
            r#"{
                "token_type": "bearer",
                "access_token": "eyJ-file-access",
                "refresh_token": "RT1-file",
                "expires_in": 3600,
                "x_refresh_token_expires_in": 8726400,
                "createdAt": 1709287200000,
                "realmId": "9130"
            }"#,
        )
        .unwrap();

        let c = read_credential(&path).unwrap();
        assert_eq!(c.realm_id.as_deref(), Some("9130"));
        assert_eq!(c.expires_in, 3600);
        assert_eq!(c.created_at.timestamp_millis(), 1_709_287_200_000);
    }

    #[test]
    fn rejects_file_that_is_not_a_credential() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, r#"{"access_token": "x"}"#).unwrap();
        let err = read_credential(&path).unwrap_err();
        assert!(err.to_string().contains("not a valid credential"));
    }
}
