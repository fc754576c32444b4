//! Runtime secret resolution.
//!
//! Config YAML stores only env var NAMES (e.g. `"SSX_SECRET_KEY"`). Callers
//! resolve them once at startup and pass [`ResolvedSecrets`] into
//! constructors. Errors name the variable, never its value.

use anyhow::{bail, Result};
use serde_json::Value;

pub const DEFAULT_SECRET_KEY_ENV: &str = "SSX_SECRET_KEY";
pub const DEFAULT_ERP_API_KEY_ENV: &str = "SSX_ERP_API_KEY";

/// Secrets for one process. Values are redacted in `Debug` output.
#[derive(Clone)]
pub struct ResolvedSecrets {
    /// Base64 AES-256 key used to seal stored credentials.
    pub secret_key: Option<String>,
    /// Bearer key presented to the ERP update endpoint.
    pub erp_api_key: Option<String>,
    pub secret_key_var: String,
    pub erp_api_key_var: String,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<REDACTED>"))
            .field("erp_api_key", &self.erp_api_key.as_ref().map(|_| "<REDACTED>"))
            .field("secret_key_var", &self.secret_key_var)
            .field("erp_api_key_var", &self.erp_api_key_var)
            .finish()
    }
}

impl ResolvedSecrets {
    /// The sealing key, or an error naming the env var that should hold it.
    pub fn require_secret_key(&self) -> Result<&str> {
        match self.secret_key.as_deref() {
            Some(v) => Ok(v),
            None => bail!(
                "SECRETS_MISSING: env var '{}' (credential sealing key) is not set",
                self.secret_key_var
            ),
        }
    }

    pub fn require_erp_api_key(&self) -> Result<&str> {
        match self.erp_api_key.as_deref() {
            Some(v) => Ok(v),
            None => bail!(
                "SECRETS_MISSING: env var '{}' (ERP api key) is not set",
                self.erp_api_key_var
            ),
        }
    }
}

fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Unset and blank variables both resolve to `None`.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve every secret named in `config_json` from the environment.
///
/// Missing values are not an error here; each consumer calls the matching
/// `require_*` accessor so a producer-only process does not need the ERP key.
pub fn resolve_secrets(config_json: &Value) -> ResolvedSecrets {
    let secret_key_var = read_str_at(config_json, "/auth/secret_key_env")
        .unwrap_or_else(|| DEFAULT_SECRET_KEY_ENV.to_string());
    let erp_api_key_var = read_str_at(config_json, "/erp/api_key_env")
        .unwrap_or_else(|| DEFAULT_ERP_API_KEY_ENV.to_string());

    ResolvedSecrets {
        secret_key: resolve_env(&secret_key_var),
        erp_api_key: resolve_env(&erp_api_key_var),
        secret_key_var,
        erp_api_key_var,
    }
}
