use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::async_task::sleep_or_shutdown;
use crate::ReleaseLog;
use crate::Result;
use crate::COMPACTED_RELEASE_EVENTS;

/// Physically removes release events made obsolete by a newer one.
#[cfg_attr(test, automock)]
pub trait CompactionExecutor: Send + Sync + 'static {
    /// Deletes every event with the same watch key as `event_id` and a lower id.
    /// Returns the number of deleted events.
    fn compact(
        &self,
        event_id: u64,
    ) -> Result<usize>;
}

/// Deletes superseded events page by page through the release log.
pub struct DefaultCompactionExecutor {
    log: Arc<dyn ReleaseLog>,
    page_size: usize,
}

impl DefaultCompactionExecutor {
    pub fn new(
        log: Arc<dyn ReleaseLog>,
        page_size: usize,
    ) -> Self {
        Self {
            log,
            page_size: page_size.max(1),
        }
    }
}

impl CompactionExecutor for DefaultCompactionExecutor {
    fn compact(
        &self,
        event_id: u64,
    ) -> Result<usize> {
        // another instance may have compacted it already
        let Some(event) = self.log.find(event_id)? else {
            debug!(event_id, "event already gone, nothing to compact");
            return Ok(0);
        };

        let mut total = 0;
        loop {
            let deleted = self.log.delete_superseded(&event.watch_key, event.id, self.page_size)?;
            total += deleted;
            if deleted < self.page_size {
                break;
            }
        }

        if total > 0 {
            COMPACTED_RELEASE_EVENTS.inc_by(total as u64);
            debug!(event_id, watch_key = %event.watch_key, total, "compacted superseded events");
        }
        Ok(total)
    }
}

/// Background task draining the compaction queue filled by the publisher.
pub struct CompactionWorker {
    executor: Arc<dyn CompactionExecutor>,
    queue: mpsc::Receiver<u64>,
    poll_timeout: Duration,
    idle_interval: Duration,
}

impl CompactionWorker {
    pub(crate) fn new(
        executor: Arc<dyn CompactionExecutor>,
        queue: mpsc::Receiver<u64>,
        poll_timeout: Duration,
        idle_interval: Duration,
    ) -> Self {
        Self {
            executor,
            queue,
            poll_timeout,
            idle_interval,
        }
    }

    /// Runs until the shutdown signal fires or every publisher is dropped.
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<()>,
    ) -> Result<()> {
        info!("compaction worker started");
        loop {
            let next = tokio::select! {
                _ = shutdown.changed() => break,
                next = timeout(self.poll_timeout, self.queue.recv()) => next,
            };

            match next {
                Ok(Some(event_id)) => {
                    if let Err(e) = self.executor.compact(event_id) {
                        warn!(event_id, ?e, "compaction failed");
                    }
                }
                Ok(None) => {
                    debug!("compaction queue closed");
                    break;
                }
                Err(_) => {
                    if sleep_or_shutdown(self.idle_interval, &mut shutdown).await {
                        break;
                    }
                }
            }
        }
        info!("compaction worker stopped");
        Ok(())
    }
}
