//! A running relay: publishing API plus the background tasks and listeners
//! spawned by [`ServerBuilder`](super::ServerBuilder).

use std::net::SocketAddr;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;
use tracing::warn;

use crate::ConfigQuery;
use crate::ConfigSnapshotCache;
use crate::LogScanner;
use crate::NamespaceCatalog;
use crate::NotificationBroker;
use crate::RelayConfig;
use crate::ReleaseLog;
use crate::ReleaseMessageCache;
use crate::ReleasePublisher;
use crate::ReleaseSource;
use crate::Result;

/// Parts wired together by the builder
pub(super) struct RelayComponents {
    pub(super) publisher: ReleasePublisher,
    pub(super) release_log: Arc<dyn ReleaseLog>,
    pub(super) catalog: Arc<dyn NamespaceCatalog>,
    pub(super) release_source: Arc<dyn ReleaseSource>,
    pub(super) scanner: Arc<LogScanner>,
    pub(super) messages: Arc<ReleaseMessageCache>,
    pub(super) snapshots: Arc<ConfigSnapshotCache>,
    pub(super) broker: Arc<NotificationBroker>,
    pub(super) configs: Arc<ConfigQuery>,
}

pub struct RelayServer {
    config: Arc<RelayConfig>,
    publisher: ReleasePublisher,
    release_log: Arc<dyn ReleaseLog>,
    catalog: Arc<dyn NamespaceCatalog>,
    release_source: Arc<dyn ReleaseSource>,
    scanner: Arc<LogScanner>,
    messages: Arc<ReleaseMessageCache>,
    snapshots: Arc<ConfigSnapshotCache>,
    broker: Arc<NotificationBroker>,
    configs: Arc<ConfigQuery>,

    local_addr: Mutex<Option<SocketAddr>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    shutdown_signal: watch::Receiver<()>,
}

impl RelayServer {
    pub(super) fn new(
        config: Arc<RelayConfig>,
        components: RelayComponents,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        let RelayComponents {
            publisher,
            release_log,
            catalog,
            release_source,
            scanner,
            messages,
            snapshots,
            broker,
            configs,
        } = components;
        Self {
            config,
            publisher,
            release_log,
            catalog,
            release_source,
            scanner,
            messages,
            snapshots,
            broker,
            configs,
            local_addr: Mutex::new(None),
            handles: Mutex::new(Vec::new()),
            shutdown_signal,
        }
    }

    /// Records a release of `watch_key` and returns its event id.
    pub fn publish(
        &self,
        watch_key: &str,
    ) -> Result<u64> {
        self.publisher.publish(watch_key)
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn release_log(&self) -> &Arc<dyn ReleaseLog> {
        &self.release_log
    }

    pub fn namespace_catalog(&self) -> &Arc<dyn NamespaceCatalog> {
        &self.catalog
    }

    pub fn release_source(&self) -> &Arc<dyn ReleaseSource> {
        &self.release_source
    }

    pub fn scanner(&self) -> &Arc<LogScanner> {
        &self.scanner
    }

    pub fn message_cache(&self) -> &Arc<ReleaseMessageCache> {
        &self.messages
    }

    pub fn snapshot_cache(&self) -> &Arc<ConfigSnapshotCache> {
        &self.snapshots
    }

    pub fn broker(&self) -> &Arc<NotificationBroker> {
        &self.broker
    }

    pub fn config_query(&self) -> &Arc<ConfigQuery> {
        &self.configs
    }

    /// `false` while the message cache could not load the release log.
    pub fn is_warmed_up(&self) -> bool {
        self.messages.is_ready()
    }

    /// Address the HTTP listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    pub(super) fn set_local_addr(
        &self,
        address: SocketAddr,
    ) {
        *self.local_addr.lock() = Some(address);
    }

    pub(super) fn track(
        &self,
        handles: Vec<JoinHandle<()>>,
    ) {
        self.handles.lock().extend(handles);
    }

    /// Waits for the shutdown signal, then for every background task to
    /// finish. Flushes the release log last.
    pub async fn run(&self) -> Result<()> {
        let mut shutdown = self.shutdown_signal.clone();
        let _ = shutdown.changed().await;
        info!("relay server shutting down");

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        for result in join_all(handles).await {
            if let Err(e) = result {
                warn!(?e, "background task failed");
            }
        }

        self.release_log.flush()?;
        info!("relay server stopped");
        Ok(())
    }
}
