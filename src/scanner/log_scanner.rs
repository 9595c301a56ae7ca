use std::panic::catch_unwind;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::ReleaseEvent;
use crate::ReleaseListener;
use crate::ReleaseLog;
use crate::ReleaseLogConfig;
use crate::Result;
use crate::LISTENER_FAILURES;
use crate::SCANNED_RELEASE_EVENTS;

/// Polls the release log for events newer than the last one seen and hands
/// them to every registered listener.
pub struct LogScanner {
    log: Arc<dyn ReleaseLog>,
    listeners: RwLock<Vec<Arc<dyn ReleaseListener>>>,
    max_id_scanned: AtomicU64,
    initialized: AtomicBool,
    scan_interval: Duration,
    batch_size: usize,
}

impl LogScanner {
    pub fn new(
        log: Arc<dyn ReleaseLog>,
        config: &ReleaseLogConfig,
    ) -> Self {
        Self {
            log,
            listeners: RwLock::new(Vec::new()),
            max_id_scanned: AtomicU64::new(0),
            initialized: AtomicBool::new(false),
            scan_interval: Duration::from_millis(config.scan_interval_in_ms),
            batch_size: config.scan_batch_size.max(1),
        }
    }

    /// Registers `listener`. Registering the same instance twice is a no-op.
    pub fn add_listener(
        &self,
        listener: Arc<dyn ReleaseListener>,
    ) {
        let mut listeners = self.listeners.write();
        let ptr = Arc::as_ptr(&listener) as *const ();
        if !listeners.iter().any(|l| Arc::as_ptr(l) as *const () == ptr) {
            listeners.push(listener);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn max_id_scanned(&self) -> u64 {
        self.max_id_scanned.load(Ordering::Acquire)
    }

    /// Starts from the newest event in the log: history is covered by the
    /// caches' own warm-up.
    pub fn initialize(&self) -> Result<()> {
        let latest = self.log.latest_id()?;
        self.max_id_scanned.store(latest, Ordering::Release);
        self.initialized.store(true, Ordering::Release);
        info!(max_id_scanned = latest, "log scanner initialized");
        Ok(())
    }

    /// Drains every event newer than `max_id_scanned`. Returns how many were dispatched.
    pub fn scan(&self) -> Result<usize> {
        if !self.initialized.load(Ordering::Acquire) {
            self.initialize()?;
        }

        let mut dispatched = 0;
        loop {
            let events = self.log.find_after(self.max_id_scanned(), self.batch_size)?;
            let Some(last) = events.last() else {
                break;
            };
            let last_id = last.id;

            self.fire(&events);
            dispatched += events.len();
            self.max_id_scanned.fetch_max(last_id, Ordering::AcqRel);

            if events.len() < self.batch_size {
                break;
            }
        }

        if dispatched > 0 {
            SCANNED_RELEASE_EVENTS.inc_by(dispatched as u64);
            debug!(dispatched, max_id_scanned = self.max_id_scanned(), "release events scanned");
        }
        Ok(dispatched)
    }

    fn fire(
        &self,
        events: &[ReleaseEvent],
    ) {
        let listeners: Vec<Arc<dyn ReleaseListener>> = self.listeners.read().clone();
        for event in events {
            for (index, listener) in listeners.iter().enumerate() {
                match catch_unwind(AssertUnwindSafe(|| listener.handle_event(event))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        LISTENER_FAILURES.with_label_values(&["error"]).inc();
                        warn!(listener = index, id = event.id, watch_key = %event.watch_key, ?e, "release listener failed");
                    }
                    Err(_) => {
                        LISTENER_FAILURES.with_label_values(&["panic"]).inc();
                        error!(listener = index, id = event.id, watch_key = %event.watch_key, "release listener panicked");
                    }
                }
            }
        }
    }

    /// Scans every `scan_interval` until shutdown. Failed ticks are logged and retried.
    pub fn start(
        self: &Arc<Self>,
        mut shutdown: watch::Receiver<()>,
    ) -> JoinHandle<()> {
        let scanner = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scanner.scan_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        info!("log scanner stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = scanner.scan() {
                            warn!(?e, "scanning release log failed");
                        }
                    }
                }
            }
        })
    }
}
