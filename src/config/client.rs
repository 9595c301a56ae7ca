use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_CLUSTER_NAME;
use crate::constants::NO_APPID_PLACEHOLDER;
use crate::Error;
use crate::Result;

/// Settings of the client library fetching configuration from relay servers
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClientConfig {
    #[serde(default = "default_app_id")]
    pub app_id: String,

    #[serde(default = "default_cluster")]
    pub cluster: String,

    #[serde(default)]
    pub data_center: Option<String>,

    /// Reported to servers as `ip`
    #[serde(default)]
    pub local_ip: Option<String>,

    /// Discovery endpoint, queried at `{meta_server_url}/services/config`
    #[serde(default = "default_meta_server_url")]
    pub meta_server_url: String,

    /// Comma separated config service urls. Bypasses discovery when set.
    #[serde(default)]
    pub config_service: Option<String>,

    /// Properties file consulted for `config_service` after the environment
    #[serde(default = "default_server_properties_path")]
    pub server_properties_path: PathBuf,

    /// Directory of the local durable cache files
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Periodic config refresh per namespace
    #[serde(default = "default_refresh_interval_in_ms")]
    pub refresh_interval_in_ms: u64,

    /// Periodic service discovery refresh
    #[serde(default = "default_discovery_refresh_interval_in_ms")]
    pub discovery_refresh_interval_in_ms: u64,

    #[serde(default = "default_load_config_qps")]
    pub load_config_qps: f64,

    #[serde(default = "default_long_poll_qps")]
    pub long_poll_qps: f64,

    /// Delay before the first long poll after a namespace is submitted
    #[serde(default = "default_long_poll_initial_delay_in_ms")]
    pub long_poll_initial_delay_in_ms: u64,

    #[serde(default = "default_connect_timeout_in_ms")]
    pub connect_timeout_in_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            app_id: default_app_id(),
            cluster: default_cluster(),
            data_center: None,
            local_ip: None,
            meta_server_url: default_meta_server_url(),
            config_service: None,
            server_properties_path: default_server_properties_path(),
            cache_dir: default_cache_dir(),
            refresh_interval_in_ms: default_refresh_interval_in_ms(),
            discovery_refresh_interval_in_ms: default_discovery_refresh_interval_in_ms(),
            load_config_qps: default_load_config_qps(),
            long_poll_qps: default_long_poll_qps(),
            long_poll_initial_delay_in_ms: default_long_poll_initial_delay_in_ms(),
            connect_timeout_in_ms: default_connect_timeout_in_ms(),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.app_id.trim().is_empty() {
            return Err(Error::Config(ConfigError::Message("app_id cannot be empty".into())));
        }

        if self.cluster.trim().is_empty() {
            return Err(Error::Config(ConfigError::Message("cluster cannot be empty".into())));
        }

        if !(self.meta_server_url.starts_with("http://") || self.meta_server_url.starts_with("https://")) {
            return Err(Error::Config(ConfigError::Message(format!(
                "meta_server_url {} must start with http:// or https://",
                self.meta_server_url
            ))));
        }

        if self.load_config_qps <= 0.0 || self.long_poll_qps <= 0.0 {
            return Err(Error::Config(ConfigError::Message(format!(
                "load_config_qps({}) and long_poll_qps({}) must be positive",
                self.load_config_qps, self.long_poll_qps
            ))));
        }

        if self.refresh_interval_in_ms == 0 || self.discovery_refresh_interval_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "refresh intervals must be greater than 0".into(),
            )));
        }

        Ok(())
    }
}

fn default_app_id() -> String {
    NO_APPID_PLACEHOLDER.to_string()
}
fn default_cluster() -> String {
    DEFAULT_CLUSTER_NAME.to_string()
}
fn default_meta_server_url() -> String {
    "http://127.0.0.1:8080".to_string()
}
fn default_server_properties_path() -> PathBuf {
    PathBuf::from("/opt/settings/server.properties")
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("/tmp/config-relay/config-cache")
}
fn default_refresh_interval_in_ms() -> u64 {
    5 * 60 * 1000
}
fn default_discovery_refresh_interval_in_ms() -> u64 {
    5 * 60 * 1000
}
fn default_load_config_qps() -> f64 {
    2.0
}
fn default_long_poll_qps() -> f64 {
    2.0
}
fn default_long_poll_initial_delay_in_ms() -> u64 {
    2000
}
fn default_connect_timeout_in_ms() -> u64 {
    1000
}
