use serde::Deserialize;
use serde::Serialize;

/// One entry of the release log: "the config behind `watch_key` changed".
///
/// Ids are assigned by the log and strictly increase in append order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseEvent {
    pub id: u64,
    pub watch_key: String,
    pub timestamp_ms: u64,
}

impl ReleaseEvent {
    pub fn new(
        id: u64,
        watch_key: impl Into<String>,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            id,
            watch_key: watch_key.into(),
            timestamp_ms,
        }
    }

    /// Id as carried in client notifications.
    pub fn notification_id(&self) -> i64 {
        self.id as i64
    }
}
