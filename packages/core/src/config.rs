//! Queue configuration and point-in-time counts.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Configuration for the queue and its worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of concurrent workers.
    pub worker_concurrency: u32,
    /// Fetched resources at or above this size are rejected.
    pub max_payload_bytes: u64,
    /// Store location ("mem://", "rocksdb://path", ...).
    pub db_endpoint: String,
    /// Cadence of "still working" signals during delivery (milliseconds).
    pub liveness_interval_ms: u64,
    /// Idle wait between claim attempts (milliseconds).
    pub poll_interval_ms: u64,
    /// Directory fetched resources are written to.
    pub work_dir: String,
    /// Caption attached to delivered media.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: 5,
            max_payload_bytes: 2_090_000_000,
            db_endpoint: "mem://".to_string(),
            liveness_interval_ms: 4_000,
            poll_interval_ms: 500,
            work_dir: "downloads".to_string(),
            caption: None,
        }
    }
}

impl QueueConfig {
    /// Build a config from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup; unset keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("WORKER_CONCURRENCY") {
            config.worker_concurrency = parse_nonzero("WORKER_CONCURRENCY", &value)?;
        }
        if let Some(value) = lookup("MAX_PAYLOAD_BYTES") {
            config.max_payload_bytes = parse_number("MAX_PAYLOAD_BYTES", &value)?;
        }
        if let Some(value) = lookup("DB_ENDPOINT") {
            config.db_endpoint = value;
        }
        if let Some(value) = lookup("LIVENESS_INTERVAL_MS") {
            config.liveness_interval_ms = parse_nonzero("LIVENESS_INTERVAL_MS", &value)?;
        }
        if let Some(value) = lookup("POLL_INTERVAL_MS") {
            config.poll_interval_ms = parse_nonzero("POLL_INTERVAL_MS", &value)?;
        }
        if let Some(value) = lookup("WORK_DIR") {
            config.work_dir = value;
        }
        config.caption = lookup("MEDIA_CAPTION").filter(|c| !c.is_empty());

        Ok(config)
    }

    /// Set the worker count.
    pub fn with_concurrency(mut self, workers: u32) -> Self {
        self.worker_concurrency = workers;
        self
    }

    /// Set the payload size limit.
    pub fn with_max_payload_bytes(mut self, bytes: u64) -> Self {
        self.max_payload_bytes = bytes;
        self
    }

    /// Set the liveness signal cadence.
    pub fn with_liveness_interval(mut self, interval: Duration) -> Self {
        self.liveness_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the idle polling interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .replace('_', "")
        .parse()
        .map_err(|_| ConfigError::Invalid {
            key,
            value: value.to_string(),
        })
}

/// Like [`parse_number`], but zero is rejected too.
fn parse_nonzero<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + Default + PartialEq,
{
    let parsed: T = parse_number(key, value)?;
    if parsed == T::default() {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        });
    }
    Ok(parsed)
}

/// Point-in-time job counts used for status reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueCounts {
    /// Jobs waiting to be claimed.
    pub queued: u64,
    /// Jobs currently claimed by a worker.
    pub running: u64,
}

impl QueueCounts {
    /// Total jobs not yet finished.
    pub fn active(&self) -> u64 {
        self.queued + self.running
    }
}
