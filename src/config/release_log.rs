use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::COMPACTION_PAGE_SIZE;
use crate::constants::SCAN_PAGE_SIZE;
use crate::Error;
use crate::Result;

/// Release log scanning and compaction parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReleaseLogConfig {
    /// Delay between two scans of the release log
    #[serde(default = "default_scan_interval_in_ms")]
    pub scan_interval_in_ms: u64,

    /// Page size of a single scan query
    #[serde(default = "default_scan_batch_size")]
    pub scan_batch_size: usize,

    /// Capacity of the compaction queue fed by the publisher.
    /// Ids offered to a full queue are dropped.
    #[serde(default = "default_compaction_queue_size")]
    pub compaction_queue_size: usize,

    /// Number of superseded events deleted per page
    #[serde(default = "default_compaction_page_size")]
    pub compaction_page_size: usize,

    /// How long the compaction worker waits on an empty queue
    #[serde(default = "default_compaction_poll_timeout_in_ms")]
    pub compaction_poll_timeout_in_ms: u64,

    /// Sleep after an idle poll
    #[serde(default = "default_compaction_idle_interval_in_ms")]
    pub compaction_idle_interval_in_ms: u64,
}

impl Default for ReleaseLogConfig {
    fn default() -> Self {
        Self {
            scan_interval_in_ms: default_scan_interval_in_ms(),
            scan_batch_size: default_scan_batch_size(),
            compaction_queue_size: default_compaction_queue_size(),
            compaction_page_size: default_compaction_page_size(),
            compaction_poll_timeout_in_ms: default_compaction_poll_timeout_in_ms(),
            compaction_idle_interval_in_ms: default_compaction_idle_interval_in_ms(),
        }
    }
}

impl ReleaseLogConfig {
    pub fn validate(&self) -> Result<()> {
        if self.scan_interval_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "scan_interval_in_ms must be greater than 0".into(),
            )));
        }

        if self.scan_batch_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "scan_batch_size must be greater than 0".into(),
            )));
        }

        if self.compaction_queue_size == 0 || self.compaction_page_size == 0 {
            return Err(Error::Config(ConfigError::Message(format!(
                "compaction_queue_size({}) and compaction_page_size({}) must be greater than 0",
                self.compaction_queue_size, self.compaction_page_size
            ))));
        }

        Ok(())
    }
}

fn default_scan_interval_in_ms() -> u64 {
    1000
}
fn default_scan_batch_size() -> usize {
    SCAN_PAGE_SIZE
}
fn default_compaction_queue_size() -> usize {
    100
}
fn default_compaction_page_size() -> usize {
    COMPACTION_PAGE_SIZE
}
fn default_compaction_poll_timeout_in_ms() -> u64 {
    1000
}
fn default_compaction_idle_interval_in_ms() -> u64 {
    5000
}
