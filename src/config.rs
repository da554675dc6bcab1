//! Configuration for the sender core and the OSS uploader.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Where batches land and how requests are addressed.
///
/// Credentials are read verbatim; the uploader signs each request with them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OssConfig {
    /// Service URL including scheme, e.g. `https://oss-cn-hangzhou.aliyuncs.com`.
    pub endpoint: String,
    pub access_key_id: String,
    pub access_key_secret: String,
    pub bucket: String,
    /// Use `{endpoint}/{bucket}/{key}` URLs instead of virtual-hosted
    /// `{bucket}.{endpoint}` addressing. Needed for MinIO and some proxies.
    #[serde(default)]
    pub path_style: bool,
}

impl OssConfig {
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            bail!("oss.endpoint must be set");
        }
        if self.access_key_id.trim().is_empty() {
            bail!("oss.access_key_id must be set");
        }
        if self.access_key_secret.trim().is_empty() {
            bail!("oss.access_key_secret must be set");
        }
        if self.bucket.trim().is_empty() {
            bail!("oss.bucket must be set");
        }
        Ok(())
    }
}

/// Tuning knobs for the batching core. Captured once at sender construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Embedded in every object key.
    pub app_name: String,
    pub object_key_prefix: String,
    /// Queue capacity in records.
    pub max_queue_size: usize,
    /// Records per batch ceiling.
    pub max_batch_count: usize,
    /// Pre-compression bytes per batch ceiling (newline included per record).
    pub max_batch_bytes: usize,
    /// Time trigger for a non-empty batch.
    pub flush_interval_millis: u64,
    /// Producer wait before falling back to an unconditional block; `<= 0`
    /// waits forever.
    pub offer_timeout_millis: i64,
    /// `true` trades loss for never suspending producers.
    pub drop_when_queue_full: bool,
    pub gzip: bool,
    pub content_type: String,
    pub max_retries: u32,
    pub initial_backoff_millis: u64,
    pub backoff_multiplier: f64,
    /// Install a ctrl-c hook that drains the sender on process shutdown.
    pub install_exit_hook: bool,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            app_name: "app".to_string(),
            object_key_prefix: "logs/".to_string(),
            max_queue_size: 200_000,
            max_batch_count: 5_000,
            max_batch_bytes: 4 * 1024 * 1024,
            flush_interval_millis: 2_000,
            offer_timeout_millis: 500,
            drop_when_queue_full: false,
            gzip: true,
            content_type: "application/x-ndjson".to_string(),
            max_retries: 5,
            initial_backoff_millis: 200,
            backoff_multiplier: 2.0,
            install_exit_hook: true,
        }
    }
}

impl SenderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_queue_size == 0 {
            bail!("max_queue_size must be at least 1");
        }
        if self.max_batch_count == 0 {
            bail!("max_batch_count must be at least 1");
        }
        if self.max_batch_bytes == 0 {
            bail!("max_batch_bytes must be at least 1");
        }
        if self.flush_interval_millis == 0 {
            bail!("flush_interval_millis must be at least 1");
        }
        Ok(())
    }

    /// A shrinking backoff is always a misconfiguration; clamp instead of
    /// failing so `offer` stays total.
    pub(crate) fn normalized(mut self) -> Self {
        if self.backoff_multiplier < 1.0 {
            self.backoff_multiplier = 1.0;
        }
        self
    }

    pub(crate) fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_millis)
    }

    pub(crate) fn offer_timeout(&self) -> Option<Duration> {
        if self.offer_timeout_millis > 0 {
            Some(Duration::from_millis(self.offer_timeout_millis as u64))
        } else {
            None
        }
    }

    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_millis),
            multiplier: self.backoff_multiplier,
        }
    }
}

/// Top-level config as loaded from a TOML file: an `[oss]` table plus an
/// optional `[sender]` table of tuning overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppenderConfig {
    pub oss: OssConfig,
    #[serde(default)]
    pub sender: SenderConfig,
}

impl AppenderConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read {}", path.as_ref().display()))?;
        let config: AppenderConfig = toml::from_str(&content)?;
        config.oss.validate()?;
        config.sender.validate()?;
        Ok(config)
    }
}
