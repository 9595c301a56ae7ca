//! Registry of parked long-poll requests, indexed by watch key.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::trace;

use crate::ConfigNotification;
use crate::LONG_POLL_RESOLUTIONS;
use crate::PENDING_LONG_POLLS;

type ResultSender = oneshot::Sender<Vec<ConfigNotification>>;

/// One parked request. Its result can be set once.
#[derive(Debug)]
pub(crate) struct PendingPoll {
    pub(crate) id: u64,
    watch_keys: BTreeSet<String>,
    slot: Mutex<Option<ResultSender>>,
    registered: AtomicBool,
    /// normalized namespace -> name the client sent
    original_names: BTreeMap<String, String>,
}

impl PendingPoll {
    /// Completes the request with `notifications`, restoring the client's
    /// namespace spelling. Returns `false` if it was already completed.
    pub(crate) fn resolve(
        &self,
        mut notifications: Vec<ConfigNotification>,
    ) -> bool {
        let Some(sender) = self.slot.lock().take() else {
            return false;
        };

        for notification in notifications.iter_mut() {
            if let Some(original) = self.original_names.get(&notification.namespace_name) {
                notification.namespace_name = original.clone();
            }
        }

        // receiver gone means the client disconnected meanwhile
        sender.send(notifications).is_ok()
    }

    /// Marks the request complete without a result.
    pub(crate) fn close(&self) -> bool {
        self.slot.lock().take().is_some()
    }
}

#[derive(Debug, Default)]
pub(crate) struct PendingRegistry {
    polls: DashMap<String, Vec<Arc<PendingPoll>>>,
    next_id: AtomicU64,
    active: AtomicUsize,
}

impl PendingRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Parks a request under every key of `watch_keys` (case-insensitive).
    /// Dropping the returned registration removes it again.
    pub(crate) fn register(
        self: &Arc<Self>,
        watch_keys: &BTreeSet<String>,
        original_names: BTreeMap<String, String>,
    ) -> (PollRegistration, oneshot::Receiver<Vec<ConfigNotification>>) {
        let (tx, rx) = oneshot::channel();
        let poll = Arc::new(PendingPoll {
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            watch_keys: watch_keys.iter().map(|k| k.to_lowercase()).collect(),
            slot: Mutex::new(Some(tx)),
            registered: AtomicBool::new(true),
            original_names,
        });

        for key in &poll.watch_keys {
            self.polls.entry(key.clone()).or_default().push(poll.clone());
        }
        self.active.fetch_add(1, Ordering::AcqRel);
        PENDING_LONG_POLLS.inc();
        trace!(id = poll.id, keys = ?poll.watch_keys, "long poll registered");

        (
            PollRegistration {
                registry: self.clone(),
                poll,
            },
            rx,
        )
    }

    /// Requests parked under `watch_key`.
    pub(crate) fn matching(
        &self,
        watch_key: &str,
    ) -> Vec<Arc<PendingPoll>> {
        self.polls
            .get(&watch_key.to_lowercase())
            .map(|polls| polls.value().clone())
            .unwrap_or_default()
    }

    /// Removes `poll` from every key it was parked under. Idempotent.
    pub(crate) fn deregister(
        &self,
        poll: &PendingPoll,
    ) {
        if !poll.registered.swap(false, Ordering::AcqRel) {
            return;
        }

        for key in &poll.watch_keys {
            if let Some(mut polls) = self.polls.get_mut(key) {
                polls.retain(|p| p.id != poll.id);
            }
            self.polls.remove_if(key, |_, polls| polls.is_empty());
        }
        self.active.fetch_sub(1, Ordering::AcqRel);
        PENDING_LONG_POLLS.dec();
        trace!(id = poll.id, "long poll deregistered");
    }

    /// Number of parked requests.
    pub(crate) fn len(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Number of keys with at least one parked request.
    #[cfg(test)]
    pub(crate) fn key_count(&self) -> usize {
        self.polls.len()
    }
}

/// Keeps a request parked for as long as it lives.
#[derive(Debug)]
pub(crate) struct PollRegistration {
    registry: Arc<PendingRegistry>,
    pub(crate) poll: Arc<PendingPoll>,
}

impl Drop for PollRegistration {
    fn drop(&mut self) {
        if self.poll.close() {
            LONG_POLL_RESOLUTIONS.with_label_values(&["cancelled"]).inc();
        }
        self.registry.deregister(&self.poll);
    }
}
