use std::net::SocketAddr;
use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Backing store for the release log
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Durable sled database under `db_root_dir`
    Sled,
    /// Process memory, lost on restart
    Memory,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Address of the HTTP listener serving notifications, configs and discovery
    #[serde(default = "default_listen_addr")]
    pub listen_address: SocketAddr,

    #[serde(default = "default_storage")]
    pub storage: StorageKind,

    #[serde(default = "default_db_dir")]
    pub db_root_dir: PathBuf,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Homepage urls returned by `/services/config`.
    /// Falls back to `http://{listen_address}/` when empty.
    #[serde(default)]
    pub advertised_urls: Vec<String>,

    /// Sled page cache size in bytes
    #[serde(default = "default_cache_capacity")]
    pub db_cache_capacity: u64,

    #[serde(default = "default_flush_every_ms")]
    pub db_flush_every_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_addr(),
            storage: default_storage(),
            db_root_dir: default_db_dir(),
            log_dir: default_log_dir(),
            advertised_urls: vec![],
            db_cache_capacity: default_cache_capacity(),
            db_flush_every_ms: default_flush_every_ms(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.storage == StorageKind::Sled && self.db_root_dir.as_os_str().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "db_root_dir must be set when storage is sled".into(),
            )));
        }

        for url in &self.advertised_urls {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::Config(ConfigError::Message(format!(
                    "advertised url {url} must start with http:// or https://"
                ))));
            }
        }

        Ok(())
    }

    /// Urls handed out to clients through discovery.
    pub fn homepage_urls(&self) -> Vec<String> {
        if self.advertised_urls.is_empty() {
            vec![format!("http://{}/", self.listen_address)]
        } else {
            self.advertised_urls.clone()
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}
fn default_storage() -> StorageKind {
    StorageKind::Sled
}
fn default_db_dir() -> PathBuf {
    PathBuf::from("/tmp/config-relay/db")
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("/tmp/config-relay/logs")
}
fn default_cache_capacity() -> u64 {
    64 * 1024 * 1024
}
fn default_flush_every_ms() -> u64 {
    500
}
