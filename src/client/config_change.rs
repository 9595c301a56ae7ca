//! Per-key differences between two versions of a namespace.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyChangeType {
    Added,
    Modified,
    Deleted,
}

/// One key whose value differs between the previous and the new configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChange {
    pub key: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub change_type: PropertyChangeType,
}

/// Delivered to [`crate::ConfigChangeListener`]s when a namespace's configuration
/// changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChangeEvent {
    pub namespace: String,
    /// Full configuration after the change
    pub configurations: BTreeMap<String, String>,
    changes: BTreeMap<String, ConfigChange>,
}

impl ConfigChangeEvent {
    /// Diffs `previous` against `current`. `None` means nothing was held before,
    /// so every key is reported as added.
    pub fn between(
        namespace: &str,
        previous: Option<&BTreeMap<String, String>>,
        current: &BTreeMap<String, String>,
    ) -> Self {
        let empty = BTreeMap::new();
        let previous = previous.unwrap_or(&empty);
        let mut changes = BTreeMap::new();

        for (key, new_value) in current {
            let change_type = match previous.get(key) {
                None => PropertyChangeType::Added,
                Some(old_value) if old_value != new_value => PropertyChangeType::Modified,
                Some(_) => continue,
            };
            changes.insert(
                key.clone(),
                ConfigChange {
                    key: key.clone(),
                    old_value: previous.get(key).cloned(),
                    new_value: Some(new_value.clone()),
                    change_type,
                },
            );
        }
        for (key, old_value) in previous {
            if !current.contains_key(key) {
                changes.insert(
                    key.clone(),
                    ConfigChange {
                        key: key.clone(),
                        old_value: Some(old_value.clone()),
                        new_value: None,
                        change_type: PropertyChangeType::Deleted,
                    },
                );
            }
        }

        Self {
            namespace: namespace.to_string(),
            configurations: current.clone(),
            changes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn changed_keys(&self) -> impl Iterator<Item = &str> {
        self.changes.keys().map(String::as_str)
    }

    pub fn get_change(
        &self,
        key: &str,
    ) -> Option<&ConfigChange> {
        self.changes.get(key)
    }

    pub fn is_changed(
        &self,
        key: &str,
    ) -> bool {
        self.changes.contains_key(key)
    }
}
