//! Client component configuration
//!
//! Base URL, link mode and the batching window policy.

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default maximum number of calls per batch.
pub const DEFAULT_BATCH_MAX: usize = 10;
/// Default batch accumulation window in milliseconds.
pub const DEFAULT_BATCH_TIMEOUT_MS: u64 = 100;

/// Batching window policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Flush as soon as this many calls are queued.
    pub max: usize,
    /// Flush this long after the first call of a window.
    pub timeout_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max: DEFAULT_BATCH_MAX,
            timeout_ms: DEFAULT_BATCH_TIMEOUT_MS,
        }
    }
}

impl BatchConfig {
    pub fn new(max: usize, timeout: Duration) -> Self {
        Self {
            max,
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max == 0 {
            return Err(ConfigError::Invalid(
                "batch.max must be at least 1".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "batch.timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// How calls reach the server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum LinkMode {
    /// One HTTP round-trip per call.
    #[default]
    Linear,
    /// Calls are coalesced into batches.
    Batch(BatchConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub url: String,
    pub link: LinkMode,
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8000/rpc".to_string(),
            link: LinkMode::default(),
            request_timeout_secs: 30,
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Invalid("client.url is empty".to_string()));
        }
        if let LinkMode::Batch(batch) = &self.link {
            batch.validate()?;
        }
        Ok(())
    }
}
