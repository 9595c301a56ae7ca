//! Release log persisted in sled.
//!
//! Layout:
//! - `_release_log`: big-endian id -> bincode `ReleaseEvent`
//! - `_release_log_by_key`: `watch_key 0x00 id` -> empty, for compaction
//! - `_release_log_meta`: last assigned id
//!
//! All three trees are written in one transaction per append.

use std::fmt::Debug;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use autometrics::autometrics;
use parking_lot::Mutex;
use sled::transaction::TransactionError;
use sled::Transactional;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;

use crate::constants::RELEASE_LOG_INDEX_TREE;
use crate::constants::RELEASE_LOG_META_TREE;
use crate::constants::RELEASE_LOG_TREE;
use crate::convert::id_from_index_key;
use crate::convert::index_key;
use crate::convert::index_prefix;
use crate::convert::safe_kv;
use crate::convert::safe_vk;
use crate::time::get_now_as_millis;
use crate::ReleaseEvent;
use crate::ReleaseLog;
use crate::Result;
use crate::StorageError;
use crate::API_SLO;

const LAST_ID_KEY: &str = "last_event_id";

pub struct SledReleaseLog {
    db: sled::Db,
    log_tree: sled::Tree,
    index_tree: sled::Tree,
    meta_tree: sled::Tree,
    last_id: AtomicU64,
    /// Appends are serialized so commit order equals id order
    append_lock: Mutex<()>,
}

impl Debug for SledReleaseLog {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SledReleaseLog")
            .field("tree_len", &self.log_tree.len())
            .field("last_id", &self.last_id.load(Ordering::Acquire))
            .finish()
    }
}

impl Drop for SledReleaseLog {
    fn drop(&mut self) {
        match self.db.flush() {
            Ok(_) => info!("Successfully flush release log"),
            Err(e) => error!(?e, "Failed to flush release log"),
        }
    }
}

impl SledReleaseLog {
    pub fn new(db: sled::Db) -> Result<Self> {
        let log_tree = db.open_tree(RELEASE_LOG_TREE)?;
        let index_tree = db.open_tree(RELEASE_LOG_INDEX_TREE)?;
        let meta_tree = db.open_tree(RELEASE_LOG_META_TREE)?;

        let persisted = match meta_tree.get(LAST_ID_KEY)? {
            Some(v) => safe_vk(&v)?,
            None => 0,
        };
        let tail = match log_tree.last()? {
            Some((k, _)) => safe_vk(&k)?,
            None => 0,
        };
        let last_id = persisted.max(tail);
        debug!(last_id, len = log_tree.len(), "release log opened");

        Ok(Self {
            db,
            log_tree,
            index_tree,
            meta_tree,
            last_id: AtomicU64::new(last_id),
            append_lock: Mutex::new(()),
        })
    }

    fn decode(bytes: &[u8]) -> Result<ReleaseEvent> {
        Ok(bincode::deserialize(bytes)?)
    }
}

impl ReleaseLog for SledReleaseLog {
    #[autometrics(objective = API_SLO)]
    fn append(
        &self,
        watch_key: &str,
    ) -> Result<ReleaseEvent> {
        let _guard = self.append_lock.lock();

        let id = self.last_id.load(Ordering::Acquire) + 1;
        let event = ReleaseEvent::new(id, watch_key, get_now_as_millis());
        let value = bincode::serialize(&event)?;
        let key = safe_kv(id).to_vec();
        let by_key = index_key(watch_key, id);

        (&self.log_tree, &self.index_tree, &self.meta_tree)
            .transaction(|(log, index, meta)| {
                log.insert(key.clone(), value.clone())?;
                index.insert(by_key.clone(), Vec::<u8>::new())?;
                meta.insert(LAST_ID_KEY, key.clone())?;
                Ok(())
            })
            .map_err(|e: TransactionError<()>| StorageError::DbError(format!("append {watch_key}: {e:?}")))?;

        self.db.flush()?;
        self.last_id.store(id, Ordering::Release);
        trace!(id, watch_key, "release event appended");
        Ok(event)
    }

    fn find(
        &self,
        id: u64,
    ) -> Result<Option<ReleaseEvent>> {
        match self.log_tree.get(safe_kv(id))? {
            Some(v) => Ok(Some(Self::decode(&v)?)),
            None => Ok(None),
        }
    }

    fn find_after(
        &self,
        id: u64,
        limit: usize,
    ) -> Result<Vec<ReleaseEvent>> {
        if id == u64::MAX || limit == 0 {
            return Ok(vec![]);
        }

        let mut events = Vec::with_capacity(limit.min(1024));
        for item in self.log_tree.range(safe_kv(id + 1)..).take(limit) {
            let (_, v) = item?;
            events.push(Self::decode(&v)?);
        }
        Ok(events)
    }

    fn latest_id(&self) -> Result<u64> {
        match self.log_tree.last()? {
            Some((k, _)) => safe_vk(&k),
            None => Ok(0),
        }
    }

    fn delete_superseded(
        &self,
        watch_key: &str,
        before_id: u64,
        limit: usize,
    ) -> Result<usize> {
        let mut ids = Vec::new();
        for item in self.index_tree.scan_prefix(index_prefix(watch_key)) {
            let (k, _) = item?;
            let id = id_from_index_key(&k)?;
            if id >= before_id || ids.len() >= limit {
                break;
            }
            ids.push(id);
        }

        if ids.is_empty() {
            return Ok(0);
        }

        (&self.log_tree, &self.index_tree)
            .transaction(|(log, index)| {
                for id in &ids {
                    log.remove(safe_kv(*id).to_vec())?;
                    index.remove(index_key(watch_key, *id))?;
                }
                Ok(())
            })
            .map_err(|e: TransactionError<()>| StorageError::DbError(format!("compact {watch_key}: {e:?}")))?;

        debug!(watch_key, before_id, deleted = ids.len(), "superseded release events deleted");
        Ok(ids.len())
    }

    fn len(&self) -> usize {
        self.log_tree.len()
    }

    fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
