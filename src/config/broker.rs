use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Long-poll fan-out parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BrokerConfig {
    /// How long a parked request waits before answering `304 Not Modified`
    #[serde(default = "default_long_poll_timeout_in_ms")]
    pub long_poll_timeout_in_ms: u64,

    /// Parked requests resolved per slice when one event matches many requests
    #[serde(default = "default_notification_batch")]
    pub notification_batch: usize,

    /// Pause between two slices
    #[serde(default = "default_notification_batch_interval_in_ms")]
    pub notification_batch_interval_in_ms: u64,

    /// Catch-up scan interval of the release message cache
    #[serde(default = "default_cache_scan_interval_in_ms")]
    pub cache_scan_interval_in_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            long_poll_timeout_in_ms: default_long_poll_timeout_in_ms(),
            notification_batch: default_notification_batch(),
            notification_batch_interval_in_ms: default_notification_batch_interval_in_ms(),
            cache_scan_interval_in_ms: default_cache_scan_interval_in_ms(),
        }
    }
}

impl BrokerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.long_poll_timeout_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "long_poll_timeout_in_ms must be greater than 0".into(),
            )));
        }

        if self.notification_batch == 0 {
            return Err(Error::Config(ConfigError::Message(
                "notification_batch must be greater than 0".into(),
            )));
        }

        if self.cache_scan_interval_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "cache_scan_interval_in_ms must be greater than 0".into(),
            )));
        }

        Ok(())
    }
}

fn default_long_poll_timeout_in_ms() -> u64 {
    60_000
}
fn default_notification_batch() -> usize {
    100
}
fn default_notification_batch_interval_in_ms() -> u64 {
    100
}
fn default_cache_scan_interval_in_ms() -> u64 {
    1000
}
