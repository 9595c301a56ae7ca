//! Configuration management for the relay server and its client library.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Environment variable overrides
//! - Configuration file support
//! - Component-wise validation
mod broker;
mod client;
mod monitoring;
mod release_log;
mod retry;
mod server;
pub use broker::*;
pub use client::*;
pub use monitoring::*;
pub use release_log::*;
pub use retry::*;
pub use server::*;
#[cfg(test)]
mod config_test;
use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Environment variable prefix for overrides, e.g. `RELAY__BROKER__LONG_POLL_TIMEOUT_IN_MS`
pub const ENV_PREFIX: &str = "RELAY";

/// Main configuration container for the relay components
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RelayConfig {
    /// Listener, storage location and advertised instances
    #[serde(default)]
    pub server: ServerConfig,
    /// Release log scanning and compaction
    #[serde(default)]
    pub release_log: ReleaseLogConfig,
    /// Long-poll notification fan-out
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Client library settings
    #[serde(default)]
    pub client: ClientConfig,
    /// Retry policies for remote operations
    #[serde(default)]
    pub retry: RetryPolicies,
    /// Metrics endpoint
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl RelayConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `RELAY__` prefix (highest priority)
    ///
    /// # Note
    /// This method does NOT validate the configuration. Callers MUST call `validate()`
    /// before using the configuration.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("CONFIG_PATH", "config/relay.toml");
    /// std::env::set_var("RELAY__BROKER__LONG_POLL_TIMEOUT_IN_MS", "30000");
    /// let cfg = RelayConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    ///
    /// Consumes self and performs validation of all subsystems. Must be called
    /// after all configuration overrides to ensure the final config is valid.
    pub fn validate(self) -> Result<Self> {
        self.server.validate()?;
        self.release_log.validate()?;
        self.broker.validate()?;
        self.client.validate()?;
        self.retry.validate()?;
        self.monitoring.validate()?;
        self.monitoring.validate_against(self.server.listen_address)?;
        Ok(self)
    }
}
