//! Typed view over the merged config JSON.
//!
//! Every read goes through a JSON pointer with a default, and every pointer
//! read here is listed in [`CONSUMED_POINTERS`] so the unused-key guard stays
//! truthful.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

pub const DEFAULT_JOB_NAME: &str = "order-status-update-producer";
pub const DEFAULT_QUEUE_TOPIC: &str = "erp-order-status-update-queue";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Pointers read by [`SyncSettings::from_config_json`] and
/// [`crate::secrets::resolve_secrets`].
pub const CONSUMED_POINTERS: &[&str] = &[
    "/job/name",
    "/job/checkpoint_epoch",
    "/job/poll_interval_secs",
    "/feed/base_url",
    "/auth/url",
    "/auth/realm_id",
    "/auth/secret_key_env",
    "/erp/base_url",
    "/erp/api_key_env",
    "/queue/topic",
    "/queue/batch_size",
    "/queue/ack_deadline_secs",
    "/queue/idle_wait_millis",
    "/consumer/processing_lease_secs",
    "/http/timeout_secs",
];

#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    /// Checkpoint row key.
    pub job_name: String,
    /// Checkpoint used when no row exists yet.
    pub checkpoint_epoch: DateTime<Utc>,
    pub poll_interval: Duration,
    pub feed_base_url: String,
    pub auth_url: String,
    pub realm_id: String,
    pub erp_base_url: String,
    pub queue_topic: String,
    pub queue_batch_size: i64,
    /// How long a received message stays invisible before redelivery.
    pub queue_ack_deadline: Duration,
    pub queue_idle_wait: Duration,
    /// `None` keeps PROCESSING claims forever (manual reset only).
    pub processing_lease: Option<Duration>,
    pub http_timeout: Duration,
}

impl SyncSettings {
    pub fn from_config_json(v: &Value) -> Result<Self> {
        let checkpoint_epoch = match str_at(v, "/job/checkpoint_epoch") {
            Some(raw) => ssx_schemas::parse_timestamp(&raw)
                .context("config /job/checkpoint_epoch is not a timestamp")?,
            None => Utc.timestamp_opt(0, 0).single().context("unix epoch")?,
        };

        let queue_batch_size = int_at(v, "/queue/batch_size")?.unwrap_or(10);
        if queue_batch_size <= 0 {
            bail!("config /queue/batch_size must be > 0 (got {queue_batch_size})");
        }

        let processing_lease = match int_at(v, "/consumer/processing_lease_secs")? {
            Some(secs) if secs > 0 => Some(Duration::from_secs(secs as u64)),
            Some(secs) => bail!("config /consumer/processing_lease_secs must be > 0 (got {secs})"),
            None => None,
        };

        Ok(Self {
            job_name: str_at(v, "/job/name").unwrap_or_else(|| DEFAULT_JOB_NAME.to_string()),
            checkpoint_epoch,
            poll_interval: secs_at(v, "/job/poll_interval_secs", 300)?,
            feed_base_url: required_str(v, "/feed/base_url")?,
            auth_url: required_str(v, "/auth/url")?,
            realm_id: required_str(v, "/auth/realm_id")?,
            erp_base_url: required_str(v, "/erp/base_url")?,
            queue_topic: str_at(v, "/queue/topic").unwrap_or_else(|| DEFAULT_QUEUE_TOPIC.to_string()),
            queue_batch_size,
            queue_ack_deadline: secs_at(v, "/queue/ack_deadline_secs", 60)?,
            queue_idle_wait: Duration::from_millis(
                int_at(v, "/queue/idle_wait_millis")?.unwrap_or(2_000).max(0) as u64,
            ),
            processing_lease,
            http_timeout: secs_at(v, "/http/timeout_secs", DEFAULT_HTTP_TIMEOUT_SECS)?,
        })
    }
}

fn str_at(v: &Value, pointer: &str) -> Option<String> {
    let s = v.pointer(pointer)?.as_str()?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn required_str(v: &Value, pointer: &str) -> Result<String> {
    str_at(v, pointer).with_context(|| format!("CONFIG_MISSING: {pointer} is required"))
}

fn int_at(v: &Value, pointer: &str) -> Result<Option<i64>> {
    match v.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(x) => x
            .as_i64()
            .map(Some)
            .with_context(|| format!("config {pointer} must be an integer")),
    }
}

fn secs_at(v: &Value, pointer: &str, default: u64) -> Result<Duration> {
    match int_at(v, pointer)? {
        None => Ok(Duration::from_secs(default)),
        Some(n) if n > 0 => Ok(Duration::from_secs(n as u64)),
        Some(n) => bail!("config {pointer} must be > 0 (got {n})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> Value {
        json!({
            "feed": {"base_url": "http://feed"},
            "auth": {"url": "http://auth/token", "realm_id": "R1"},
            "erp": {"base_url": "http://erp"}
        })
    }

    #[test]
    fn defaults_apply() {
        let s = SyncSettings::from_config_json(&minimal()).unwrap();
        assert_eq!(s.job_name, DEFAULT_JOB_NAME);
        assert_eq!(s.checkpoint_epoch.timestamp(), 0);
        assert_eq!(s.http_timeout, Duration::from_secs(30));
        assert_eq!(s.queue_topic, DEFAULT_QUEUE_TOPIC);
        assert_eq!(s.queue_batch_size, 10);
        assert!(s.processing_lease.is_none());
    }

    #[test]
    fn missing_feed_url_is_an_error() {
        let mut v = minimal();
        v["feed"] = json!({});
        let err = SyncSettings::from_config_json(&v).unwrap_err();
        assert!(err.to_string().contains("/feed/base_url"));
    }

    #[test]
    fn lease_and_epoch_are_read() {
        let mut v = minimal();
        v["consumer"] = json!({"processing_lease_secs": 900});
        v["job"] = json!({"checkpoint_epoch": "2024-01-01"});
        let s = SyncSettings::from_config_json(&v).unwrap();
        assert_eq!(s.processing_lease, Some(Duration::from_secs(900)));
        assert_eq!(s.checkpoint_epoch.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn zero_lease_is_rejected() {
        let mut v = minimal();
        v["consumer"] = json!({"processing_lease_secs": 0});
        assert!(SyncSettings::from_config_json(&v).is_err());
    }
}
