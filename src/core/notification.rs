//! Wire types exchanged between relay servers and clients.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::NOTIFICATION_ID_PLACEHOLDER;

/// Last seen release id per watch key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMessages {
    #[serde(default)]
    pub details: BTreeMap<String, i64>,
}

impl NotificationMessages {
    pub fn put(
        &mut self,
        key: impl Into<String>,
        notification_id: i64,
    ) {
        self.details.insert(key.into(), notification_id);
    }

    pub fn get(
        &self,
        key: &str,
    ) -> Option<i64> {
        self.details.get(key).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.details.is_empty()
    }

    /// Takes every id from `source` that is strictly larger than ours.
    pub fn merge_from(
        &mut self,
        source: &NotificationMessages,
    ) {
        for (key, id) in &source.details {
            match self.details.get(key) {
                Some(existing) if *existing >= *id => {}
                _ => {
                    self.details.insert(key.clone(), *id);
                }
            }
        }
    }
}

/// A namespace together with the newest release id the receiver knows about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigNotification {
    pub namespace_name: String,
    #[serde(default = "default_notification_id")]
    pub notification_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<NotificationMessages>,
}

impl ConfigNotification {
    pub fn new(
        namespace_name: impl Into<String>,
        notification_id: i64,
    ) -> Self {
        Self {
            namespace_name: namespace_name.into(),
            notification_id,
            messages: None,
        }
    }

    pub fn add_message(
        &mut self,
        key: impl Into<String>,
        notification_id: i64,
    ) {
        self.messages
            .get_or_insert_with(NotificationMessages::default)
            .put(key, notification_id);
    }
}

fn default_notification_id() -> i64 {
    NOTIFICATION_ID_PLACEHOLDER
}
