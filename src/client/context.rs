use std::sync::Arc;

use super::ConfigTransport;
use super::LocalFileCache;
use super::ServiceLocator;
use crate::ClientConfig;
use crate::RetryPolicies;

/// Collaborators shared by every repository and the long-poll loop of one
/// client.
#[derive(Clone)]
pub struct ClientContext {
    pub config: Arc<ClientConfig>,
    pub retry: RetryPolicies,
    pub transport: Arc<dyn ConfigTransport>,
    pub locator: Arc<ServiceLocator>,
    pub local_cache: LocalFileCache,
}

impl ClientContext {
    pub fn new(
        config: ClientConfig,
        retry: RetryPolicies,
        transport: Arc<dyn ConfigTransport>,
    ) -> Self {
        let locator = Arc::new(ServiceLocator::new(&config, &retry, transport.clone()));
        let local_cache = LocalFileCache::new(config.cache_dir.clone());
        Self {
            config: Arc::new(config),
            retry,
            transport,
            locator,
            local_cache,
        }
    }
}
