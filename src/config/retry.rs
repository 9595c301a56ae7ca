use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Basic retry policy template
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Maximum number of retries (0 means unlimited retries)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Single operation timeout (unit: milliseconds)
    #[serde(default = "default_op_timeout_ms")]
    pub timeout_ms: u64,

    /// Backoff base (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl BackoffPolicy {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn validate(
        &self,
        name: &str,
    ) -> Result<()> {
        if self.base_delay_ms > self.max_delay_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "{name}: base_delay_ms({}) must not exceed max_delay_ms({})",
                self.base_delay_ms, self.max_delay_ms
            ))));
        }
        Ok(())
    }
}

/// Divide strategies by business domain
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryPolicies {
    /// Config fetch passes over the server list
    #[serde(default)]
    pub config_load: BackoffPolicy,

    /// Long-poll loop after a failed poll
    #[serde(default)]
    pub long_poll: BackoffPolicy,

    /// Synchronous service discovery through the meta service
    #[serde(default)]
    pub discovery: BackoffPolicy,
}

// Default value implementation
impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            config_load: BackoffPolicy {
                max_retries: 1,
                timeout_ms: 5000,
                base_delay_ms: 1000,
                max_delay_ms: 8000,
            },
            long_poll: BackoffPolicy {
                max_retries: 0,
                timeout_ms: 90_000,
                base_delay_ms: 1000,
                max_delay_ms: 120_000,
            },
            discovery: BackoffPolicy {
                max_retries: 2,
                timeout_ms: 1000,
                base_delay_ms: 1000,
                max_delay_ms: 1000,
            },
        }
    }
}

impl RetryPolicies {
    pub fn validate(&self) -> Result<()> {
        self.config_load.validate("config_load")?;
        self.long_poll.validate("long_poll")?;
        self.discovery.validate("discovery")?;
        Ok(())
    }
}

fn default_max_retries() -> usize {
    3
}
fn default_op_timeout_ms() -> u64 {
    1000
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    8000
}
