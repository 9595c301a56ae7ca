use std::net::SocketAddr;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Prometheus scrape endpoint of the relay server.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub metrics_enabled: bool,

    /// Address of the scrape listener, separate from the relay HTTP listener
    #[serde(default = "default_metrics_address")]
    pub metrics_address: SocketAddr,

    /// Single path segment the collectors are served under
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: default_metrics_address(),
            metrics_path: default_metrics_path(),
        }
    }
}

impl MonitoringConfig {
    /// # Errors
    /// Returns `Error::Config` when the scrape endpoint is enabled with a
    /// port of 0, a privileged port, or a path that is not one segment.
    pub fn validate(&self) -> Result<()> {
        if !self.metrics_enabled {
            #[cfg(debug_assertions)]
            if self.metrics_address != default_metrics_address() {
                tracing::warn!(
                    "metrics_address configured to {} but the metrics endpoint is disabled",
                    self.metrics_address
                );
            }
            return Ok(());
        }

        let port = self.metrics_address.port();
        if port == 0 {
            return Err(invalid("metrics_address needs a fixed port when enabled".to_string()));
        }
        if port < 1024 {
            return Err(invalid(format!(
                "metrics port {port} is a privileged port (requires root)"
            )));
        }
        if self.metrics_path.is_empty() || self.metrics_path.contains('/') {
            return Err(invalid(format!(
                "metrics_path {:?} must be a single path segment",
                self.metrics_path
            )));
        }
        Ok(())
    }

    /// Rejects a scrape listener that would collide with the relay listener.
    pub fn validate_against(
        &self,
        relay_address: SocketAddr,
    ) -> Result<()> {
        if self.metrics_enabled && relay_address.port() != 0 && relay_address.port() == self.metrics_address.port() {
            return Err(invalid(format!(
                "metrics port {} is already used by the relay listener",
                relay_address.port()
            )));
        }
        Ok(())
    }
}

fn invalid(message: String) -> Error {
    Error::Config(ConfigError::Message(message))
}

fn default_metrics_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9090))
}

fn default_metrics_path() -> String {
    "metrics".to_string()
}
