//! A builder assembling a [`RelayServer`] from its parts.
//!
//! The [`ServerBuilder`] wires the release log, the publisher and its
//! compaction worker, the log scanner and its listeners, and the HTTP surface.
//!
//! ## Key Design Points
//! - **Default Components**: sled or in-memory release log depending on `server.storage`, in-memory
//!   namespace catalog and release source.
//! - **Customization**: defaults can be replaced via `release_log()`, `namespace_catalog()` and
//!   `release_source()`.
//! - **Lifecycle Management**:
//!   - `build()`: Assembles the [`RelayServer`] and spawns its background tasks.
//!   - `start_metrics_server()`/`start_http_server()`: Launches the listeners.
//!   - `ready()`: Returns the running [`RelayServer`].
//!
//! ## Example
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(());
//! let server = ServerBuilder::init(relay_config, shutdown_rx)
//!     .build()?
//!     .start_metrics_server(shutdown_tx.subscribe())
//!     .start_http_server()?
//!     .ready()?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::RelayComponents;
use super::RelayServer;
use crate::constants::CONFIG_SERVICE_APP_NAME;
use crate::init_sled_release_log_db;
use crate::metrics;
use crate::network::bind;
use crate::network::HttpState;
use crate::utils::async_task::spawn_task;
use crate::ConfigQuery;
use crate::ConfigSnapshotCache;
use crate::Error;
use crate::InMemoryNamespaceCatalog;
use crate::InMemoryReleaseSource;
use crate::LogScanner;
use crate::MemReleaseLog;
use crate::NamespaceCatalog;
use crate::NotificationBroker;
use crate::RelayConfig;
use crate::ReleaseLog;
use crate::ReleaseMessageCache;
use crate::ReleasePublisher;
use crate::ReleaseSource;
use crate::Result;
use crate::ServiceInstance;
use crate::SledReleaseLog;
use crate::StorageError;
use crate::StorageKind;

pub struct ServerBuilder {
    pub(super) config: RelayConfig,
    pub(super) release_log: Option<Arc<dyn ReleaseLog>>,
    pub(super) catalog: Option<Arc<dyn NamespaceCatalog>>,
    pub(super) release_source: Option<Arc<dyn ReleaseSource>>,
    pub(super) shutdown_signal: watch::Receiver<()>,

    pub(super) server: Option<Arc<RelayServer>>,
}

impl ServerBuilder {
    /// Loads the relay config from defaults, `CONFIG_PATH` and the
    /// environment, then applies `config_path` on top.
    pub fn new(
        config_path: Option<&str>,
        shutdown_signal: watch::Receiver<()>,
    ) -> Result<Self> {
        let mut config = RelayConfig::new()?;
        if let Some(path) = config_path {
            info!("with_override_config from: {}", path);
            config = config.with_override_config(path)?;
        }
        Ok(Self::init(config.validate()?, shutdown_signal))
    }

    /// Core initialization logic shared by all construction paths
    pub fn init(
        config: RelayConfig,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            config,
            release_log: None,
            catalog: None,
            release_source: None,
            shutdown_signal,
            server: None,
        }
    }

    /// Sets a custom release log implementation
    pub fn release_log(
        mut self,
        release_log: Arc<dyn ReleaseLog>,
    ) -> Self {
        self.release_log = Some(release_log);
        self
    }

    /// Sets the namespace catalog owned by the admin side
    pub fn namespace_catalog(
        mut self,
        catalog: Arc<dyn NamespaceCatalog>,
    ) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Sets the source of active releases owned by the admin side
    pub fn release_source(
        mut self,
        release_source: Arc<dyn ReleaseSource>,
    ) -> Self {
        self.release_source = Some(release_source);
        self
    }

    /// Replaces the entire relay configuration
    pub fn config(
        mut self,
        config: RelayConfig,
    ) -> Self {
        self.config = config;
        self
    }

    /// Assembles the server and spawns compaction, scanning and cache
    /// catch-up.
    ///
    /// A release log that cannot be read at this point leaves the message
    /// cache cold: the server still starts and the catch-up task keeps
    /// retrying the warm-up.
    pub fn build(mut self) -> Result<Self> {
        let config = Arc::new(self.config.clone());
        let shutdown = self.shutdown_signal.clone();
        let mut handles = Vec::new();

        let release_log = match self.release_log.take() {
            Some(log) => log,
            None => open_release_log(&config)?,
        };
        let catalog = self
            .catalog
            .take()
            .unwrap_or_else(|| Arc::new(InMemoryNamespaceCatalog::new()));
        let release_source = self
            .release_source
            .take()
            .unwrap_or_else(|| Arc::new(InMemoryReleaseSource::new()));

        let (publisher, compaction_worker) = ReleasePublisher::new(release_log.clone(), &config.release_log);
        let compaction_shutdown = shutdown.clone();
        spawn_task(
            "compaction_worker",
            move || compaction_worker.run(compaction_shutdown),
            Some(&mut handles),
        );

        let messages = Arc::new(ReleaseMessageCache::new(
            release_log.clone(),
            config.release_log.scan_batch_size,
            Duration::from_millis(config.broker.cache_scan_interval_in_ms),
        ));
        match messages.warm_up() {
            Ok(loaded) => info!(loaded, "release message cache warmed up"),
            Err(e) => error!(?e, "release message cache warm-up failed, serving degraded"),
        }
        handles.push(messages.start_catch_up(shutdown.clone()));

        let snapshots = Arc::new(ConfigSnapshotCache::new(release_source.clone(), messages.clone()));
        let broker = Arc::new(NotificationBroker::new(catalog.clone(), messages.clone(), &config.broker));

        let scanner = Arc::new(LogScanner::new(release_log.clone(), &config.release_log));
        scanner.add_listener(messages.clone());
        scanner.add_listener(snapshots.clone());
        scanner.add_listener(broker.clone());
        if let Err(e) = scanner.initialize() {
            warn!(?e, "log scanner initialization failed, retrying on first scan");
        }
        handles.push(scanner.start(shutdown.clone()));

        let configs = Arc::new(ConfigQuery::new(catalog.clone(), snapshots.clone()));
        let server = RelayServer::new(
            config,
            RelayComponents {
                publisher,
                release_log,
                catalog,
                release_source,
                scanner,
                messages,
                snapshots,
                broker,
                configs,
            },
            shutdown,
        );
        server.track(handles);

        self.server = Some(Arc::new(server));
        Ok(self)
    }

    /// Starts the Prometheus endpoint when `monitoring.metrics_enabled`.
    pub fn start_metrics_server(
        self,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        let monitoring = &self.config.monitoring;
        if !monitoring.metrics_enabled {
            return self;
        }
        let address = monitoring.metrics_address;
        let path = monitoring.metrics_path.clone();
        let handle = tokio::spawn(async move {
            metrics::start_server(address, path, shutdown_signal).await;
        });
        if let Some(server) = &self.server {
            server.track(vec![handle]);
        }
        self
    }

    /// Binds the HTTP listener and serves it until shutdown.
    ///
    /// # Errors
    /// Fails when the server has not been built or the address cannot be bound.
    pub fn start_http_server(self) -> Result<Self> {
        let server = self
            .server
            .clone()
            .ok_or_else(|| Error::Fatal("start_http_server called before build".to_string()))?;

        let instances = self
            .config
            .server
            .homepage_urls()
            .iter()
            .map(|url| ServiceInstance::from_url(CONFIG_SERVICE_APP_NAME, url))
            .collect();
        let state = HttpState {
            broker: server.broker().clone(),
            configs: server.config_query().clone(),
            instances: Arc::new(instances),
        };

        let (address, serving) = bind(self.config.server.listen_address, state, self.shutdown_signal.clone())?;
        info!(%address, "relay http server listening");
        server.set_local_addr(address);
        server.track(vec![tokio::spawn(serving)]);
        Ok(self)
    }

    /// Returns the built server.
    ///
    /// # Errors
    /// Returns `Error::Fatal` if build hasn't completed
    pub fn ready(self) -> Result<Arc<RelayServer>> {
        self.server
            .ok_or_else(|| Error::Fatal("check server ready failed".to_string()))
    }
}

fn open_release_log(config: &RelayConfig) -> Result<Arc<dyn ReleaseLog>> {
    match config.server.storage {
        StorageKind::Memory => Ok(Arc::new(MemReleaseLog::new())),
        StorageKind::Sled => {
            let db = init_sled_release_log_db(&config.server.db_root_dir, &config.server).map_err(|e| {
                Error::from(StorageError::PathError {
                    path: config.server.db_root_dir.clone(),
                    source: e,
                })
            })?;
            Ok(Arc::new(SledReleaseLog::new(db)?))
        }
    }
}
