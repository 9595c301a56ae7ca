//! Resolves the config service endpoints a client talks to.
//!
//! A static list wins over discovery. It is looked up in the client config,
//! then in the `RELAY_CONFIG_SERVICE` environment variable, then under
//! `config_service` in the server properties file. Without one, the meta
//! service is asked and the answer refreshed periodically.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::parse_properties;
use super::ConfigTransport;
use crate::constants::CONFIG_SERVICE_APP_NAME;
use crate::constants::CONFIG_SERVICE_ENV;
use crate::constants::CONFIG_SERVICE_PROPERTY;
use crate::utils::async_task::sleep_or_shutdown;
use crate::utils::async_task::task_with_timeout_and_exponential_backoff;
use crate::BackoffPolicy;
use crate::ClientConfig;
use crate::ClientError;
use crate::Error;
use crate::Result;
use crate::RetryPolicies;
use crate::ServiceInstance;

pub struct ServiceLocator {
    transport: Arc<dyn ConfigTransport>,
    meta_server_url: String,
    app_id: String,
    local_ip: Option<String>,
    services: ArcSwap<Vec<ServiceInstance>>,
    customized: bool,
    refresh_interval: Duration,
    discovery_policy: BackoffPolicy,
    update_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for ServiceLocator {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ServiceLocator")
            .field("meta_server_url", &self.meta_server_url)
            .field("customized", &self.customized)
            .field("services", &self.services.load().len())
            .finish()
    }
}

impl ServiceLocator {
    pub fn new(
        config: &ClientConfig,
        retry: &RetryPolicies,
        transport: Arc<dyn ConfigTransport>,
    ) -> Self {
        let customized = customized_services(config);
        if let Some(services) = &customized {
            info!(count = services.len(), "using customized config services");
        }

        Self {
            transport,
            meta_server_url: config.meta_server_url.clone(),
            app_id: config.app_id.clone(),
            local_ip: config.local_ip.clone(),
            customized: customized.is_some(),
            services: ArcSwap::from_pointee(customized.unwrap_or_default()),
            refresh_interval: Duration::from_millis(config.discovery_refresh_interval_in_ms),
            discovery_policy: retry.discovery,
            update_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// `true` when the service list is static and never refreshed.
    pub fn is_customized(&self) -> bool {
        self.customized
    }

    /// Current service list. An empty list triggers one synchronous
    /// discovery round first.
    pub async fn get_services(&self) -> Result<Vec<ServiceInstance>> {
        let current = self.services.load_full();
        if !current.is_empty() {
            return Ok(current.as_ref().clone());
        }

        if !self.customized {
            if let Err(e) = self.update_services().await {
                warn!(?e, "synchronous config service discovery failed");
            }
        }

        let refreshed = self.services.load_full();
        if refreshed.is_empty() {
            return Err(ClientError::NoServiceAvailable.into());
        }
        Ok(refreshed.as_ref().clone())
    }

    /// Queries the meta service and replaces the service list. An empty
    /// answer is treated as a failed attempt.
    pub async fn update_services(&self) -> Result<()> {
        if self.customized {
            return Ok(());
        }

        let _guard = self.update_lock.lock().await;
        let services = task_with_timeout_and_exponential_backoff(
            || async {
                let services = self
                    .transport
                    .discover_services(self.meta_server_url.clone(), self.app_id.clone(), self.local_ip.clone())
                    .await?;
                if services.is_empty() {
                    return Err(Error::from(ClientError::MetaService {
                        url: self.meta_server_url.clone(),
                        reason: "empty config service list".to_string(),
                    }));
                }
                Ok(services)
            },
            self.discovery_policy,
        )
        .await?;

        debug!(count = services.len(), "config services discovered");
        self.services.store(Arc::new(services));
        Ok(())
    }

    /// Refreshes the list every discovery interval until shutdown. Nothing
    /// is spawned for a customized list.
    pub fn start_periodic_refresh(
        self: &Arc<Self>,
        mut shutdown: watch::Receiver<()>,
    ) -> Option<JoinHandle<()>> {
        if self.customized {
            return None;
        }

        let locator = self.clone();
        Some(tokio::spawn(async move {
            loop {
                if sleep_or_shutdown(locator.refresh_interval, &mut shutdown).await {
                    debug!("service locator refresh stopped");
                    return;
                }
                if let Err(e) = locator.update_services().await {
                    warn!(?e, "periodic config service discovery failed");
                }
            }
        }))
    }
}

/// Static service list from config, environment or the properties file, in
/// that order.
pub fn customized_services(config: &ClientConfig) -> Option<Vec<ServiceInstance>> {
    let raw = config
        .config_service
        .clone()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| std::env::var(CONFIG_SERVICE_ENV).ok().filter(|s| !s.trim().is_empty()))
        .or_else(|| from_properties_file(&config.server_properties_path))?;

    let services: Vec<ServiceInstance> = raw
        .split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(|url| ServiceInstance::from_url(CONFIG_SERVICE_APP_NAME, url))
        .collect();

    if services.is_empty() {
        None
    } else {
        Some(services)
    }
}

fn from_properties_file(path: &Path) -> Option<String> {
    let text = std::fs::read_to_string(path).ok()?;
    parse_properties(&text)
        .remove(CONFIG_SERVICE_PROPERTY)
        .filter(|s| !s.trim().is_empty())
}
