//! ssx-config
//!
//! Layered YAML configuration for the sync pipeline.
//!
//! - YAML documents are merged in order; later documents override earlier ones.
//! - The merged document is hashed (SHA-256 over canonical JSON) so every log
//!   line of a run can be tied to the exact configuration it ran with.
//! - Secret values never live in YAML. Config stores env var NAMES; see
//!   [`secrets`].

pub mod secrets;
pub mod settings;

pub use secrets::{resolve_secrets, ResolvedSecrets};
pub use settings::{SyncSettings, CONSUMED_POINTERS};

use anyhow::{bail, Context, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

/// Upstream credential shapes that must never be pasted into YAML.
const CREDENTIAL_PREFIXES: &[&str] = &[
    "eyJ",        // JWT access / id tokens
    "RT1-",       // refresh tokens
    "-----BEGIN", // PEM keys
    "Bearer ",
    "bearer ",
];

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// SHA-256 of `canonical_json`, lowercase hex.
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let docs = paths
        .iter()
        .map(|p| fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}")))
        .collect::<Result<Vec<String>>>()?;
    let doc_refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());
    for (i, raw) in yaml_docs.iter().enumerate() {
        let layer: serde_yaml::Value =
            serde_yaml::from_str(raw).with_context(|| format!("invalid yaml in layer {i}"))?;
        let layer = serde_json::to_value(layer).context("yaml->json conversion failed")?;
        // empty file
        if layer.is_null() {
            continue;
        }
        overlay(&mut merged, layer);
    }

    if let Some(ptr) = first_credential_literal(&merged) {
        bail!("CONFIG_SECRET_DETECTED leaf={ptr} value=REDACTED");
    }

    let canonical_json = serde_json::to_string(&merged).context("canonical json serialize failed")?;
    let config_hash = hex::encode(Sha256::digest(canonical_json.as_bytes()));
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Maps merge key by key; anything else in `top` replaces `base`.
fn overlay(base: &mut Value, top: Value) {
    match (base, top) {
        (Value::Object(base_map), Value::Object(top_map)) => {
            for (k, v) in top_map {
                match base_map.get_mut(&k) {
                    Some(slot) => overlay(slot, v),
                    None => {
                        base_map.insert(k, v);
                    }
                }
            }
        }
        (slot, top) => *slot = top,
    }
}

fn first_credential_literal(v: &Value) -> Option<String> {
    leaf_pointers(v).into_iter().find(|ptr| {
        v.pointer(ptr)
            .and_then(Value::as_str)
            .is_some_and(looks_like_credential)
    })
}

fn looks_like_credential(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    CREDENTIAL_PREFIXES.iter().any(|p| t.starts_with(p)) || is_sealing_key(t)
}

/// A base64 string of exactly 32 bytes is the shape of the AES sealing key.
fn is_sealing_key(t: &str) -> bool {
    t.len() == 44
        && base64::engine::general_purpose::STANDARD
            .decode(t)
            .is_ok_and(|raw| raw.len() == 32)
}

// ---------------------------------------------------------------------------
// Unused-key guard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    pub consumed_prefixes: Vec<String>,
    /// Sorted, deduplicated.
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Config leaves not under any of [`CONSUMED_POINTERS`]. A misspelt key
/// would otherwise fall back to its default without a word.
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let mut consumed_prefixes: Vec<String> = CONSUMED_POINTERS
        .iter()
        .map(|p| format!("/{}", segments(p).join("/")))
        .collect();
    consumed_prefixes.sort();
    consumed_prefixes.dedup();

    let mut unused: Vec<String> = leaf_pointers(config_json)
        .into_iter()
        .filter(|leaf| !consumed_prefixes.iter().any(|p| covers(p, leaf)))
        .collect();
    unused.sort();
    unused.dedup();

    if policy == UnusedKeyPolicy::Fail && !unused.is_empty() {
        bail!(
            "CONFIG_UNUSED_KEYS: {} unused config leaf key(s): {:?}",
            unused.len(),
            unused.iter().take(12).collect::<Vec<_>>()
        );
    }

    Ok(UnusedKeyReport {
        consumed_prefixes,
        unused_leaf_pointers: unused,
    })
}

fn segments(pointer: &str) -> Vec<&str> {
    pointer.split('/').filter(|s| !s.is_empty()).collect()
}

/// Whole-segment prefix match: "/feed" covers "/feed/base_url", not "/feedback".
fn covers(prefix: &str, leaf: &str) -> bool {
    let p = segments(prefix);
    let l = segments(leaf);
    p.len() <= l.len() && p.iter().zip(&l).all(|(a, b)| a == b)
}

/// RFC 6901 pointers to every scalar in `v`. A scalar root is "/".
fn leaf_pointers(v: &Value) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack: Vec<(String, &Value)> = vec![(String::new(), v)];
    while let Some((ptr, node)) = stack.pop() {
        match node {
            Value::Object(map) => {
                for (k, child) in map {
                    let k = k.replace('~', "~0").replace('/', "~1");
                    stack.push((format!("{ptr}/{k}"), child));
                }
            }
            Value::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    stack.push((format!("{ptr}/{i}"), child));
                }
            }
            _ if ptr.is_empty() => out.push("/".to_string()),
            _ => out.push(ptr),
        }
    }
    out
}
