use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::ClientContext;
use super::ConfigClient;
use super::ConfigTransport;
use super::ReqwestTransport;
use crate::ClientConfig;
use crate::Result;
use crate::RetryPolicies;

pub struct ConfigClientBuilder {
    config: ClientConfig,
    retry: RetryPolicies,
    transport: Option<Arc<dyn ConfigTransport>>,
}

impl ConfigClientBuilder {
    /// Create a new builder with default config for `app_id`
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            config: ClientConfig {
                app_id: app_id.into(),
                ..ClientConfig::default()
            },
            retry: RetryPolicies::default(),
            transport: None,
        }
    }

    /// Set cluster (default: `default`)
    pub fn cluster(
        mut self,
        cluster: impl Into<String>,
    ) -> Self {
        self.config.cluster = cluster.into();
        self
    }

    /// Set meta service url used for discovery
    pub fn meta_server_url(
        mut self,
        url: impl Into<String>,
    ) -> Self {
        self.config.meta_server_url = url.into();
        self
    }

    /// Pin config service urls, comma separated. Disables discovery.
    pub fn config_service(
        mut self,
        urls: impl Into<String>,
    ) -> Self {
        self.config.config_service = Some(urls.into());
        self
    }

    /// Set the directory of the local cache files
    pub fn cache_dir(
        mut self,
        dir: impl Into<PathBuf>,
    ) -> Self {
        self.config.cache_dir = dir.into();
        self
    }

    /// Set periodic refresh interval (default: 5min)
    pub fn refresh_interval(
        mut self,
        interval: Duration,
    ) -> Self {
        self.config.refresh_interval_in_ms = interval.as_millis() as u64;
        self
    }

    pub fn retry_policies(
        mut self,
        retry: RetryPolicies,
    ) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the HTTP transport
    pub fn transport(
        mut self,
        transport: Arc<dyn ConfigTransport>,
    ) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Completely replaces the default configuration
    ///
    /// Discards every setting made through the granular methods such as
    /// [`cluster`](ConfigClientBuilder::cluster) before this call.
    pub fn set_config(
        mut self,
        config: ClientConfig,
    ) -> Self {
        self.config = config;
        self
    }

    /// Build the client. Background tasks stop when `shutdown` fires.
    pub fn build(
        self,
        shutdown: watch::Receiver<()>,
    ) -> Result<ConfigClient> {
        self.config.validate()?;
        let transport: Arc<dyn ConfigTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&self.config, &self.retry)?),
        };
        Ok(ConfigClient::new(
            ClientContext::new(self.config, self.retry, transport),
            shutdown,
        ))
    }
}
