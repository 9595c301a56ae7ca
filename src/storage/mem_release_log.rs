use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use parking_lot::RwLock;
use tracing::trace;

use crate::time::get_now_as_millis;
use crate::ReleaseEvent;
use crate::ReleaseLog;
use crate::Result;
use crate::StorageError;

/// Release log kept in process memory.
///
/// Used when `server.storage = "memory"` and by tests. Can be switched
/// offline to exercise store outages.
#[derive(Debug)]
pub struct MemReleaseLog {
    inner: RwLock<MemLogInner>,
    available: AtomicBool,
}

#[derive(Debug, Default)]
struct MemLogInner {
    events: BTreeMap<u64, ReleaseEvent>,
    last_id: u64,
}

impl Default for MemReleaseLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemReleaseLog {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemLogInner::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Makes every subsequent operation fail with `LogUnavailable` until re-enabled.
    pub fn set_available(
        &self,
        available: bool,
    ) {
        self.available.store(available, Ordering::Release);
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StorageError::LogUnavailable("in-memory release log is offline".into()).into())
        }
    }
}

impl ReleaseLog for MemReleaseLog {
    fn append(
        &self,
        watch_key: &str,
    ) -> Result<ReleaseEvent> {
        self.ensure_available()?;
        let mut inner = self.inner.write();
        inner.last_id += 1;
        let event = ReleaseEvent::new(inner.last_id, watch_key, get_now_as_millis());
        inner.events.insert(event.id, event.clone());
        trace!(id = event.id, watch_key, "release event appended");
        Ok(event)
    }

    fn find(
        &self,
        id: u64,
    ) -> Result<Option<ReleaseEvent>> {
        self.ensure_available()?;
        Ok(self.inner.read().events.get(&id).cloned())
    }

    fn find_after(
        &self,
        id: u64,
        limit: usize,
    ) -> Result<Vec<ReleaseEvent>> {
        self.ensure_available()?;
        let inner = self.inner.read();
        Ok(inner
            .events
            .range((Bound::Excluded(id), Bound::Unbounded))
            .take(limit)
            .map(|(_, e)| e.clone())
            .collect())
    }

    fn latest_id(&self) -> Result<u64> {
        self.ensure_available()?;
        Ok(self.inner.read().events.keys().next_back().copied().unwrap_or(0))
    }

    fn delete_superseded(
        &self,
        watch_key: &str,
        before_id: u64,
        limit: usize,
    ) -> Result<usize> {
        self.ensure_available()?;
        let mut inner = self.inner.write();
        let ids: Vec<u64> = inner
            .events
            .range(..before_id)
            .filter(|(_, e)| e.watch_key == watch_key)
            .map(|(id, _)| *id)
            .take(limit)
            .collect();
        for id in &ids {
            inner.events.remove(id);
        }
        Ok(ids.len())
    }

    fn len(&self) -> usize {
        self.inner.read().events.len()
    }

    fn flush(&self) -> Result<()> {
        self.ensure_available()
    }
}
