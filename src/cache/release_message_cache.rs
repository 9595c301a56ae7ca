use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::utils::async_task::sleep_or_shutdown;
use crate::ReleaseEvent;
use crate::ReleaseListener;
use crate::ReleaseLog;
use crate::Result;
use crate::CACHE_GAP_RELOADS;

/// Latest release event per watch key, kept in memory.
///
/// Filled by a full scan at startup, then kept current by the log scanner
/// pushing events. A background catch-up scan covers the window between
/// warm-up and the first pushed event.
pub struct ReleaseMessageCache {
    log: Arc<dyn ReleaseLog>,
    cache: DashMap<String, ReleaseEvent>,
    max_id_scanned: AtomicU64,
    merge_lock: Mutex<()>,
    do_scan: AtomicBool,
    ready: AtomicBool,
    batch_size: usize,
    scan_interval: Duration,
}

impl ReleaseMessageCache {
    pub fn new(
        log: Arc<dyn ReleaseLog>,
        batch_size: usize,
        scan_interval: Duration,
    ) -> Self {
        Self {
            log,
            cache: DashMap::new(),
            max_id_scanned: AtomicU64::new(0),
            merge_lock: Mutex::new(()),
            do_scan: AtomicBool::new(true),
            ready: AtomicBool::new(false),
            batch_size: batch_size.max(1),
            scan_interval,
        }
    }

    /// Loads every event of the log. Must complete before the cache serves reads.
    pub fn warm_up(&self) -> Result<usize> {
        let loaded = self.load_from(0)?;
        self.ready.store(true, Ordering::Release);
        info!(loaded, keys = self.cache.len(), "release message cache warmed up");
        Ok(loaded)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn max_id_scanned(&self) -> u64 {
        self.max_id_scanned.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// The event with the highest id among `keys`.
    pub fn latest_for<I, S>(
        &self,
        keys: I,
    ) -> Option<ReleaseEvent>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        keys.into_iter()
            .filter_map(|k| self.cache.get(k.as_ref()).map(|e| e.value().clone()))
            .max_by_key(|e| e.id)
    }

    /// The latest event of each key that has one.
    pub fn latest_per_key<I, S>(
        &self,
        keys: I,
    ) -> Vec<ReleaseEvent>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        keys.into_iter()
            .filter_map(|k| self.cache.get(k.as_ref()).map(|e| e.value().clone()))
            .collect()
    }

    /// Pages through every event after `start_id`. Returns how many were read.
    pub fn load_from(
        &self,
        start_id: u64,
    ) -> Result<usize> {
        let mut start_id = start_id;
        let mut loaded = 0;
        loop {
            let events = self.log.find_after(start_id, self.batch_size)?;
            let Some(last) = events.last() else {
                break;
            };
            start_id = last.id;

            let scanned = events.len();
            loaded += scanned;
            for event in events {
                self.merge(event);
            }
            debug!(scanned, start_id, "loaded release events into cache");

            if scanned < self.batch_size {
                break;
            }
        }
        Ok(loaded)
    }

    /// Keeps `event` unless the cache already holds an id at least as large.
    pub(crate) fn merge(
        &self,
        event: ReleaseEvent,
    ) {
        let _guard = self.merge_lock.lock();
        let id = event.id;
        let replace = match self.cache.get(&event.watch_key) {
            Some(existing) => existing.id < id,
            None => true,
        };
        if replace {
            self.cache.insert(event.watch_key.clone(), event);
        }
        self.max_id_scanned.fetch_max(id, Ordering::AcqRel);
    }

    /// Periodically loads new events until the first pushed event arrives.
    /// Retries the warm-up first if it failed at startup.
    pub fn start_catch_up(
        self: &Arc<Self>,
        mut shutdown: watch::Receiver<()>,
    ) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            while cache.do_scan.load(Ordering::Acquire) {
                let result = if cache.is_ready() {
                    cache.load_from(cache.max_id_scanned()).map(|_| ())
                } else {
                    cache.warm_up().map(|_| ())
                };
                if let Err(e) = result {
                    error!(?e, max_id_scanned = cache.max_id_scanned(), "scan new release events failed");
                }

                if sleep_or_shutdown(cache.scan_interval, &mut shutdown).await {
                    break;
                }
            }
            debug!("release message cache catch-up scan stopped");
        })
    }
}

impl ReleaseListener for ReleaseMessageCache {
    fn handle_event(
        &self,
        event: &ReleaseEvent,
    ) -> Result<()> {
        // the scanner is live from here on
        self.do_scan.store(false, Ordering::Release);

        if !self.is_ready() {
            warn!(id = event.id, "release message cache not warmed up, loading full log");
            self.warm_up()?;
            self.merge(event.clone());
            return Ok(());
        }

        let max_id_scanned = self.max_id_scanned();
        if event.id > max_id_scanned + 1 {
            CACHE_GAP_RELOADS.inc();
            info!(id = event.id, max_id_scanned, "gap in release events, loading missing ones");
            self.load_from(max_id_scanned)?;
        }
        self.merge(event.clone());
        Ok(())
    }
}
