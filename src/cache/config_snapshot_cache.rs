use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;
use tracing::warn;

use crate::assemble_key;
use crate::constants::NOTIFICATION_ID_PLACEHOLDER;
use crate::NotificationMessages;
use crate::Release;
use crate::ReleaseEvent;
use crate::ReleaseListener;
use crate::ReleaseMessageCache;
use crate::ReleaseSource;
use crate::Result;
use crate::WatchKey;

/// Cached answer for one watch key: the release id clients were told about
/// and the release that was active when the entry was loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigCacheEntry {
    pub notification_id: i64,
    pub release: Option<Release>,
}

impl ConfigCacheEntry {
    fn empty() -> Self {
        Self {
            notification_id: NOTIFICATION_ID_PLACEHOLDER,
            release: None,
        }
    }
}

/// Active releases per watch key, invalidated by release events.
pub struct ConfigSnapshotCache {
    releases: Arc<dyn ReleaseSource>,
    messages: Arc<ReleaseMessageCache>,
    entries: DashMap<String, ConfigCacheEntry>,
}

impl ConfigSnapshotCache {
    pub fn new(
        releases: Arc<dyn ReleaseSource>,
        messages: Arc<ReleaseMessageCache>,
    ) -> Self {
        Self {
            releases,
            messages,
            entries: DashMap::new(),
        }
    }

    /// Active release of `app_id+cluster+namespace`.
    ///
    /// When the client already knows a newer id for the key than the cached
    /// entry, the entry is stale: it is dropped and reloaded.
    pub fn find_latest_release(
        &self,
        app_id: &str,
        cluster: &str,
        namespace: &str,
        client_messages: Option<&NotificationMessages>,
    ) -> Result<Option<Release>> {
        let key = assemble_key(app_id, cluster, namespace);
        let mut entry = self.get_or_load(&key)?;

        if let Some(client_id) = client_messages.and_then(|m| m.get(&key)) {
            if client_id > entry.notification_id {
                debug!(%key, client_id, cached_id = entry.notification_id, "config cache entry outdated");
                self.invalidate(&key);
                entry = self.get_or_load(&key)?;
            }
        }

        Ok(entry.release)
    }

    pub fn invalidate(
        &self,
        key: &str,
    ) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get_or_load(
        &self,
        key: &str,
    ) -> Result<ConfigCacheEntry> {
        if let Some(entry) = self.entries.get(key) {
            return Ok(entry.value().clone());
        }

        let loaded = self.load(key)?;

        // a concurrent reload may have stored a newer entry meanwhile
        let mut slot = self.entries.entry(key.to_string()).or_insert_with(|| loaded.clone());
        if slot.notification_id < loaded.notification_id {
            *slot = loaded;
        }
        Ok(slot.value().clone())
    }

    fn load(
        &self,
        key: &str,
    ) -> Result<ConfigCacheEntry> {
        let Ok(watch_key) = WatchKey::parse(key) else {
            warn!(%key, "invalid config cache key");
            return Ok(ConfigCacheEntry::empty());
        };

        let notification_id = self
            .messages
            .latest_for([key])
            .map(|e| e.notification_id())
            .unwrap_or(NOTIFICATION_ID_PLACEHOLDER);
        let release =
            self.releases
                .find_latest_active_release(&watch_key.app_id, &watch_key.cluster, &watch_key.namespace)?;

        Ok(ConfigCacheEntry {
            notification_id,
            release,
        })
    }
}

impl ReleaseListener for ConfigSnapshotCache {
    fn handle_event(
        &self,
        event: &ReleaseEvent,
    ) -> Result<()> {
        self.invalidate(&event.watch_key);
        // warm up
        self.get_or_load(&event.watch_key)?;
        Ok(())
    }
}
