//! Client library fetching configuration from relay servers
//!
//! - [`ConfigClient`] - Entry point, one repository per namespace
//! - [`ConfigClientBuilder`] - Configurable client construction
//! - [`RemoteConfigRepository`] - Conditional fetch, retry and local fallback
//! - [`ConfigChangeEvent`] - Per-key changes delivered to listeners
//! - [`RemoteLongPollService`] - Change notifications over long polling
//! - [`ServiceLocator`] - Static or discovered config service endpoints
//!
//! # Basic Usage
//! ```no_run
//! use config_relay::ConfigClient;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(());
//!     let client = ConfigClient::builder("sample-app")
//!         .config_service("http://127.0.0.1:8080")
//!         .cache_dir("/tmp/config-relay/config-cache")
//!         .build(shutdown_rx)
//!         .unwrap();
//!
//!     let config = client.get_config("application").await.unwrap();
//!     println!("timeout = {:?}", config.get("timeout"));
//! }
//! ```

mod builder;
mod config_change;
mod config_client;
mod context;
mod local_cache;
mod locator;
mod long_poll;
mod rate_limiter;
mod remote_repository;
mod schedule_policy;
mod transport;

pub use builder::*;
pub use config_change::*;
pub use config_client::*;
pub use context::*;
pub use local_cache::*;
pub use locator::*;
pub use long_poll::*;
pub use rate_limiter::*;
pub use remote_repository::*;
pub use schedule_policy::*;
pub use transport::*;

#[cfg(test)]
mod locator_test;
