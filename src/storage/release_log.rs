#[cfg(test)]
use mockall::automock;

use crate::ReleaseEvent;
use crate::Result;

/// Ordered durable log of release events.
///
/// Ids are assigned by the log in append order and never reused. Events are
/// immutable; the only removal is [`ReleaseLog::delete_superseded`], which
/// never touches the newest event of a watch key.
#[cfg_attr(test, automock)]
pub trait ReleaseLog: Send + Sync + 'static {
    /// Appends an event for `watch_key`. The event is visible to every
    /// subsequent read once this returns.
    fn append(
        &self,
        watch_key: &str,
    ) -> Result<ReleaseEvent>;

    fn find(
        &self,
        id: u64,
    ) -> Result<Option<ReleaseEvent>>;

    /// Up to `limit` events with an id strictly greater than `id`, ascending.
    fn find_after(
        &self,
        id: u64,
        limit: usize,
    ) -> Result<Vec<ReleaseEvent>>;

    /// Largest id in the log, `0` when empty.
    fn latest_id(&self) -> Result<u64>;

    /// Deletes up to `limit` events of `watch_key` with an id below
    /// `before_id`, oldest first. Returns how many were deleted.
    fn delete_superseded(
        &self,
        watch_key: &str,
        before_id: u64,
        limit: usize,
    ) -> Result<usize>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn flush(&self) -> Result<()>;
}
