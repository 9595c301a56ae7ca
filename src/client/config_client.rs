//! Entry point of the client library.
//!
//! [`ConfigClient`] owns one [`RemoteConfigRepository`] per namespace and a
//! single long-poll loop shared by all of them.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;
use tracing::warn;

use super::ClientContext;
use super::ConfigClientBuilder;
use super::ConfigChangeListener;
use super::RemoteConfigRepository;
use super::RemoteLongPollService;
use super::ServiceLocator;
use crate::ClientConfig;
use crate::Result;

pub struct ConfigClient {
    ctx: ClientContext,
    long_poll: Arc<RemoteLongPollService>,
    repositories: DashMap<String, Arc<RemoteConfigRepository>>,
    locator_started: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
    shutdown: watch::Receiver<()>,
}

impl std::fmt::Debug for ConfigClient {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ConfigClient")
            .field("app_id", &self.ctx.config.app_id)
            .field("cluster", &self.ctx.config.cluster)
            .field("namespaces", &self.repositories.len())
            .finish()
    }
}

impl ConfigClient {
    /// Create a configured client builder for `app_id`
    pub fn builder(app_id: impl Into<String>) -> ConfigClientBuilder {
        ConfigClientBuilder::new(app_id)
    }

    pub(super) fn new(
        ctx: ClientContext,
        shutdown: watch::Receiver<()>,
    ) -> Self {
        Self {
            long_poll: Arc::new(RemoteLongPollService::new(ctx.clone())),
            ctx,
            repositories: DashMap::new(),
            locator_started: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
            shutdown,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.ctx.config
    }

    pub fn locator(&self) -> &Arc<ServiceLocator> {
        &self.ctx.locator
    }

    pub fn long_poll(&self) -> &Arc<RemoteLongPollService> {
        &self.long_poll
    }

    /// Repository of `namespace`, created and synchronized on first use.
    ///
    /// A first sync failure is logged only; the repository keeps retrying in
    /// the background.
    pub async fn repository(
        &self,
        namespace: &str,
    ) -> Arc<RemoteConfigRepository> {
        if let Some(repository) = self.repositories.get(namespace) {
            return repository.clone();
        }

        let repository = match self.repositories.entry(namespace.to_string()) {
            Entry::Occupied(existing) => return existing.get().clone(),
            Entry::Vacant(slot) => slot
                .insert(Arc::new(RemoteConfigRepository::new(namespace, self.ctx.clone())))
                .clone(),
        };

        // watched before the first await, so dropping this future cannot
        // leave a registered namespace without refresh or long poll
        self.start_locator_refresh();
        let refresh = repository.start_periodic_refresh(self.shutdown.clone());
        self.handles.lock().push(refresh);
        self.long_poll.submit(namespace, repository.clone(), self.shutdown.clone());
        info!(namespace, "namespace registered");

        if let Err(e) = repository.sync().await {
            warn!(namespace, ?e, "initial sync failed");
        }
        repository
    }

    /// Current configuration of `namespace`.
    pub async fn get_config(
        &self,
        namespace: &str,
    ) -> Result<BTreeMap<String, String>> {
        self.repository(namespace).await.get_config().await
    }

    pub async fn add_change_listener(
        &self,
        namespace: &str,
        listener: Arc<dyn ConfigChangeListener>,
    ) {
        self.repository(namespace).await.add_change_listener(listener);
    }

    /// Waits for every background task after the shutdown signal fired.
    pub async fn join(&self) {
        let mut handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        handles.extend(self.long_poll.take_handle());
        for result in join_all(handles).await {
            if let Err(e) = result {
                warn!(?e, "client task failed");
            }
        }
    }

    fn start_locator_refresh(&self) {
        if self.locator_started.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.ctx.locator.start_periodic_refresh(self.shutdown.clone()) {
            self.handles.lock().push(handle);
        }
    }
}
