//! AES-256-GCM sealing for credentials at rest.
//!
//! Format: base64(nonce || ciphertext || auth_tag), 96-bit random nonce per
//! seal. The plaintext is the credential's JSON encoding.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use ssx_schemas::Credential;

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CipherError {
    #[error("sealing key must be 32 bytes (got {0} bytes)")]
    KeyLength(usize),
    #[error("sealing key is not valid base64")]
    KeyEncoding,
    #[error("seal failed: {0}")]
    Seal(String),
    #[error("open failed: {0}")]
    Open(String),
}

#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialCipher(<REDACTED>)")
    }
}

impl CredentialCipher {
    pub fn from_key(key: &[u8]) -> Result<Self, CipherError> {
        if key.len() != KEY_SIZE {
            return Err(CipherError::KeyLength(key.len()));
        }
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CipherError::KeyLength(key.len()))?;
        Ok(Self { cipher })
    }

    /// Fresh random key, base64 encoded for an env var.
    pub fn generate_key() -> String {
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        BASE64.encode(key)
    }

    /// Key as resolved from the environment: standard base64 of 32 bytes.
    pub fn from_base64_key(encoded: &str) -> Result<Self, CipherError> {
        let key = BASE64
            .decode(encoded.trim())
            .map_err(|_| CipherError::KeyEncoding)?;
        Self::from_key(&key)
    }

    pub fn seal(&self, credential: &Credential) -> Result<String, CipherError> {
        let plaintext =
            serde_json::to_vec(credential).map_err(|e| CipherError::Seal(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_slice())
            .map_err(|e| CipherError::Seal(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(&out))
    }

    pub fn open(&self, sealed: &str) -> Result<Credential, CipherError> {
        let raw = BASE64
            .decode(sealed.trim())
            .map_err(|e| CipherError::Open(format!("base64 decode failed: {e}")))?;
        if raw.len() < NONCE_SIZE + 1 {
            return Err(CipherError::Open("sealed value too short".to_string()));
        }

        let nonce = Nonce::from_slice(&raw[..NONCE_SIZE]);
        let plaintext = self
            .cipher
            .decrypt(nonce, &raw[NONCE_SIZE..])
            // aead::Error carries no detail; wrong key and tampering look the same.
            .map_err(|_| CipherError::Open("authentication failed".to_string()))?;

        serde_json::from_slice(&plaintext).map_err(|e| CipherError::Open(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn generated_key_is_usable_and_random() {
        let a = CredentialCipher::generate_key();
        assert_ne!(a, CredentialCipher::generate_key());
        assert!(CredentialCipher::from_base64_key(&a).is_ok());
    }

    fn cred() -> Credential {
        Credential {
            access_token: "eyJlbmMiOiJBMTI4Q0JDLUhTMjU2In0.secret".into(),
            token_type: "bearer".into(),
            created_at: Utc.timestamp_millis_opt(1_770_323_175_692).unwrap(),
            expires_in: 3600,
            refresh_token: Some("RT1-206-H0-refresh".into()),
            x_refresh_token_expires_in: Some(8_726_400),
            id_token: None,
            realm_id: Some("123189227149329".into()),
        }
    }

    #[test]
    fn seal_then_open_restores_credential() {
        let c = CredentialCipher::from_key(&[0x42u8; 32]).unwrap();
        let sealed = c.seal(&cred()).unwrap();
        assert!(!sealed.contains("eyJlbmMi"));
        assert_eq!(c.open(&sealed).unwrap(), cred());
    }

    #[test]
    fn nonce_differs_per_seal() {
        let c = CredentialCipher::from_key(&[7u8; 32]).unwrap();
        assert_ne!(c.seal(&cred()).unwrap(), c.seal(&cred()).unwrap());
    }

    #[test]
    fn wrong_key_fails_to_open() {
        let a = CredentialCipher::from_key(&[1u8; 32]).unwrap();
        let b = CredentialCipher::from_key(&[2u8; 32]).unwrap();
        let sealed = a.seal(&cred()).unwrap();
        assert!(matches!(b.open(&sealed), Err(CipherError::Open(_))));
    }

    #[test]
    fn tampered_ciphertext_fails_to_open() {
        let c = CredentialCipher::from_key(&[3u8; 32]).unwrap();
        let sealed = c.seal(&cred()).unwrap();
        let mut raw = BASE64.decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        assert!(c.open(&BASE64.encode(raw)).is_err());
        assert!(c.open("not base64!").is_err());
    }

    #[test]
    fn key_must_be_32_bytes() {
        assert_eq!(
            CredentialCipher::from_key(&[0u8; 16]).unwrap_err(),
            CipherError::KeyLength(16)
        );
        let k = BASE64.encode([9u8; 32]);
        assert!(CredentialCipher::from_base64_key(&k).is_ok());
        assert_eq!(
            CredentialCipher::from_base64_key("%%%").unwrap_err(),
            CipherError::KeyEncoding
        );
    }
}
