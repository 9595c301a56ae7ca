use std::collections::BTreeMap;

use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

use crate::ReleaseEvent;
use crate::ReleaseListener;
use crate::ReleaseLog;
use crate::Release;
use crate::RelayConfig;
use crate::Result;
use crate::StorageKind;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
}

/// Appends one event per key, in order.
pub(crate) fn seed_log(
    log: &dyn ReleaseLog,
    keys: &[&str],
) -> Vec<ReleaseEvent> {
    keys.iter().map(|k| log.append(k).unwrap()).collect()
}

pub(crate) fn release(
    app_id: &str,
    cluster: &str,
    namespace: &str,
    release_key: &str,
    pairs: &[(&str, &str)],
) -> Release {
    Release {
        app_id: app_id.to_string(),
        cluster: cluster.to_string(),
        namespace: namespace.to_string(),
        release_key: release_key.to_string(),
        configurations: pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>(),
    }
}

/// Relay config with in-memory storage and short intervals.
pub(crate) fn fast_relay_config() -> RelayConfig {
    let mut config = RelayConfig::default();
    config.server.storage = StorageKind::Memory;
    config.server.listen_address = "127.0.0.1:0".parse().unwrap();
    config.release_log.scan_interval_in_ms = 20;
    config.release_log.compaction_poll_timeout_in_ms = 20;
    config.release_log.compaction_idle_interval_in_ms = 20;
    config.broker.long_poll_timeout_in_ms = 500;
    config.broker.cache_scan_interval_in_ms = 20;
    config.broker.notification_batch_interval_in_ms = 5;
    config
}

/// Listener recording every event it sees, optionally failing on a given id.
#[derive(Debug, Default)]
pub(crate) struct RecordingListener {
    pub(crate) seen: Mutex<Vec<u64>>,
    pub(crate) fail_on: Option<u64>,
    pub(crate) panic_on: Option<u64>,
}

impl RecordingListener {
    pub(crate) fn ids(&self) -> Vec<u64> {
        self.seen.lock().clone()
    }
}

impl ReleaseListener for RecordingListener {
    fn handle_event(
        &self,
        event: &ReleaseEvent,
    ) -> Result<()> {
        self.seen.lock().push(event.id);
        if self.panic_on == Some(event.id) {
            panic!("listener panic on {}", event.id);
        }
        if self.fail_on == Some(event.id) {
            return Err(crate::Error::Fatal(format!("listener failure on {}", event.id)));
        }
        Ok(())
    }
}
