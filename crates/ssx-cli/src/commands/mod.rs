//! Command handler modules for ssx-cli.
//!
//! Shared wiring (config loading, store and vault construction) lives here.
//! Command-specific logic lives in the submodules.

pub mod ledger;
pub mod pipeline;
pub mod vault;

use std::sync::Arc;

use anyhow::{Context, Result};
use ssx_config::{
    load_layered_yaml, report_unused_keys, resolve_secrets, LoadedConfig, ResolvedSecrets,
    SyncSettings, UnusedKeyPolicy,
};
use ssx_db::PgStore;
use ssx_vault::{CredentialCipher, HttpTokenRefresher, TokenVault};

/// Everything a pipeline command needs from configuration.
pub struct Wiring {
    pub loaded: LoadedConfig,
    pub settings: SyncSettings,
    pub secrets: ResolvedSecrets,
}

/// Load layered YAML, warn about unread keys, parse settings and resolve
/// secrets from the environment.
pub fn load_wiring(paths: &[String]) -> Result<Wiring> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = load_layered_yaml(&path_refs)?;

    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    for key in &report.unused_leaf_pointers {
        eprintln!("WARN: config key {key} is not read by any command");
    }

    let settings = SyncSettings::from_config_json(&loaded.config_json)?;
    let secrets = resolve_secrets(&loaded.config_json);
    Ok(Wiring {
        loaded,
        settings,
        secrets,
    })
}

pub async fn pg_store() -> Result<Arc<PgStore>> {
    let pool = ssx_db::connect_from_env().await?;
    Ok(Arc::new(PgStore::new(pool)))
}

pub fn build_vault(store: Arc<PgStore>, w: &Wiring) -> Result<TokenVault> {
    let cipher = CredentialCipher::from_base64_key(w.secrets.require_secret_key()?)
        .context("sealing key from env")?;
    let refresher = HttpTokenRefresher::new(&w.settings.auth_url, w.settings.http_timeout)?;
    Ok(TokenVault::new(store, Arc::new(refresher), cipher))
}

/// Resolves when the operator hits Ctrl-C.
pub async fn ctrl_c() {
    let _ = tokio::signal::ctrl_c().await;
}

pub fn opt_dt(v: &Option<chrono::DateTime<chrono::Utc>>) -> String {
    v.map(|d| ssx_schemas::format_timestamp(&d))
        .unwrap_or_else(|| "null".to_string())
}
