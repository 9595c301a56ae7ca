use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use config_relay::AppNamespace;
use config_relay::InMemoryNamespaceCatalog;
use config_relay::InMemoryReleaseSource;
use config_relay::RelayConfig;
use config_relay::RelayServer;
use config_relay::Release;
use config_relay::ServerBuilder;
use config_relay::StorageKind;
use tokio::sync::watch;
use tokio::time;
use tracing_subscriber::EnvFilter;

pub const APP_ID: &str = "sample-app";
pub const CLUSTER: &str = "default";
pub const NAMESPACE: &str = "application";
pub const WATCH_KEY: &str = "sample-app+default+application";

pub const LONG_POLL_TIMEOUT_IN_MS: u64 = 800;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
}

/// A relay listening on an ephemeral port, with in-memory admin data.
pub struct TestRelay {
    pub server: Arc<RelayServer>,
    pub source: Arc<InMemoryReleaseSource>,
    pub address: SocketAddr,
    pub shutdown: watch::Sender<()>,
}

impl TestRelay {
    pub fn url(&self) -> String {
        format!("http://{}", self.address)
    }

    /// Makes `pairs` the active release of the sample namespace and announces it.
    pub fn release(
        &self,
        release_key: &str,
        pairs: &[(&str, &str)],
    ) -> u64 {
        self.source.put(Release {
            app_id: APP_ID.to_string(),
            cluster: CLUSTER.to_string(),
            namespace: NAMESPACE.to_string(),
            release_key: release_key.to_string(),
            configurations: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        });
        self.server.publish(WATCH_KEY).unwrap()
    }

    /// Waits until the relay has scanned event `id`.
    pub async fn wait_scanned(
        &self,
        id: u64,
    ) {
        for _ in 0..300 {
            if self.server.message_cache().max_id_scanned() >= id {
                return;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        panic!("event {id} was never scanned");
    }
}

pub fn relay_config() -> RelayConfig {
    let mut config = RelayConfig::default();
    config.server.storage = StorageKind::Memory;
    config.server.listen_address = "127.0.0.1:0".parse().unwrap();
    config.release_log.scan_interval_in_ms = 20;
    config.broker.long_poll_timeout_in_ms = LONG_POLL_TIMEOUT_IN_MS;
    config.broker.cache_scan_interval_in_ms = 20;
    config.broker.notification_batch_interval_in_ms = 5;
    config
}

pub fn start_relay() -> TestRelay {
    enable_logger();
    let catalog = Arc::new(InMemoryNamespaceCatalog::new());
    catalog.register(AppNamespace::private(APP_ID, NAMESPACE));
    let source = Arc::new(InMemoryReleaseSource::new());

    let (shutdown, shutdown_rx) = watch::channel(());
    let server = ServerBuilder::init(relay_config(), shutdown_rx)
        .namespace_catalog(catalog)
        .release_source(source.clone())
        .build()
        .unwrap()
        .start_http_server()
        .unwrap()
        .ready()
        .unwrap();
    let address = server.local_addr().unwrap();

    TestRelay {
        server,
        source,
        address,
        shutdown,
    }
}
