use std::sync::Arc;
use std::time::Duration;

use autometrics::autometrics;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use tracing::warn;

use crate::CompactionWorker;
use crate::DefaultCompactionExecutor;
use crate::ReleaseLog;
use crate::ReleaseLogConfig;
use crate::Result;
use crate::WatchKey;
use crate::API_SLO;
use crate::COMPACTION_QUEUE_DROPS;
use crate::PUBLISHED_RELEASE_EVENTS;

/// Turns "config behind this watch key changed" into a durable release event.
pub struct ReleasePublisher {
    log: Arc<dyn ReleaseLog>,
    compaction_queue: mpsc::Sender<u64>,
}

impl ReleasePublisher {
    /// Builds the publisher and the worker compacting what it publishes.
    /// The worker must be spawned by the caller.
    pub fn new(
        log: Arc<dyn ReleaseLog>,
        config: &ReleaseLogConfig,
    ) -> (Self, CompactionWorker) {
        let (tx, rx) = mpsc::channel(config.compaction_queue_size.max(1));
        let executor = Arc::new(DefaultCompactionExecutor::new(log.clone(), config.compaction_page_size));
        let worker = CompactionWorker::new(
            executor,
            rx,
            Duration::from_millis(config.compaction_poll_timeout_in_ms),
            Duration::from_millis(config.compaction_idle_interval_in_ms),
        );

        (
            Self {
                log,
                compaction_queue: tx,
            },
            worker,
        )
    }

    /// Appends an event for `watch_key` and returns its id.
    ///
    /// The event is durable and visible to scans when this returns.
    /// Compaction of older events for the same key is best effort.
    #[autometrics(objective = API_SLO)]
    pub fn publish(
        &self,
        watch_key: &str,
    ) -> Result<u64> {
        WatchKey::parse(watch_key)?;

        let event = match self.log.append(watch_key) {
            Ok(event) => event,
            Err(e) => {
                PUBLISHED_RELEASE_EVENTS.with_label_values(&["error"]).inc();
                warn!(watch_key, ?e, "failed to append release event");
                return Err(e);
            }
        };
        PUBLISHED_RELEASE_EVENTS.with_label_values(&["ok"]).inc();
        debug!(id = event.id, watch_key, "release event published");

        match self.compaction_queue.try_send(event.id) {
            Ok(()) => {}
            Err(TrySendError::Full(id)) => {
                COMPACTION_QUEUE_DROPS.inc();
                warn!(id, "compaction queue is full, skip compacting");
            }
            Err(TrySendError::Closed(id)) => {
                debug!(id, "compaction worker stopped, skip compacting");
            }
        }

        Ok(event.id)
    }
}
