use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use autometrics::autometrics;
use tokio::runtime::Handle;
use tracing::debug;
use tracing::error;
use tracing::info;

use super::pending::PendingPoll;
use super::pending::PendingRegistry;
use crate::constants::NOTIFICATION_ID_PLACEHOLDER;
use crate::filter_namespace_name;
use crate::namespace_of;
use crate::normalize_namespace;
use crate::BrokerConfig;
use crate::ConfigNotification;
use crate::InvalidInputError;
use crate::NamespaceCatalog;
use crate::ReleaseEvent;
use crate::ReleaseListener;
use crate::ReleaseMessageCache;
use crate::Result;
use crate::WatchKeysAssembler;
use crate::API_SLO;
use crate::LONG_POLL_RESOLUTIONS;
use crate::NOTIFICATION_FANOUT;

/// A long-poll request as received from a client.
#[derive(Debug, Clone, Default)]
pub struct PollRequest {
    pub app_id: String,
    pub cluster: String,
    pub notifications: Vec<ConfigNotification>,
    pub data_center: Option<String>,
    pub client_ip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Namespaces with a newer release than the client knows
    Changed(Vec<ConfigNotification>),
    /// Nothing changed before the long-poll timeout
    NotModified,
}

/// Parks long-poll requests and completes them when a release event for one
/// of their watch keys arrives.
pub struct NotificationBroker {
    catalog: Arc<dyn NamespaceCatalog>,
    assembler: WatchKeysAssembler,
    messages: Arc<ReleaseMessageCache>,
    registry: Arc<PendingRegistry>,
    long_poll_timeout: Duration,
    notification_batch: usize,
    notification_batch_interval: Duration,
}

impl NotificationBroker {
    pub fn new(
        catalog: Arc<dyn NamespaceCatalog>,
        messages: Arc<ReleaseMessageCache>,
        config: &BrokerConfig,
    ) -> Self {
        Self {
            assembler: WatchKeysAssembler::new(catalog.clone()),
            catalog,
            messages,
            registry: Arc::new(PendingRegistry::new()),
            long_poll_timeout: Duration::from_millis(config.long_poll_timeout_in_ms),
            notification_batch: config.notification_batch.max(1),
            notification_batch_interval: Duration::from_millis(config.notification_batch_interval_in_ms),
        }
    }

    /// Decodes the `notifications` query parameter. An empty list is invalid.
    pub fn parse_notifications(raw: &str) -> Result<Vec<ConfigNotification>> {
        let notifications: Vec<ConfigNotification> = serde_json::from_str(raw)
            .map_err(|e| InvalidInputError::Notifications(format!("{raw}: {e}")))?;
        if notifications.is_empty() {
            return Err(InvalidInputError::Notifications(raw.to_string()).into());
        }
        Ok(notifications)
    }

    /// Keys the notifications by normalized namespace name.
    ///
    /// When two names normalize to the same namespace, the one with the lower
    /// notification id is kept so the client catches up from the older state.
    pub fn filter_notifications(
        &self,
        app_id: &str,
        notifications: Vec<ConfigNotification>,
    ) -> BTreeMap<String, ConfigNotification> {
        let mut filtered: BTreeMap<String, ConfigNotification> = BTreeMap::new();
        for mut notification in notifications {
            if notification.namespace_name.is_empty() {
                continue;
            }
            let original = filter_namespace_name(&notification.namespace_name);
            let normalized = normalize_namespace(self.catalog.as_ref(), app_id, &original);
            notification.namespace_name = original;

            if let Some(existing) = filtered.get(&normalized) {
                if existing.notification_id < notification.notification_id {
                    continue;
                }
            }
            filtered.insert(normalized, notification);
        }
        filtered
    }

    /// Answers immediately if any watched namespace has a newer release,
    /// otherwise waits for one until the long-poll timeout.
    #[autometrics(objective = API_SLO)]
    pub async fn poll(
        &self,
        request: PollRequest,
    ) -> Result<PollOutcome> {
        let filtered = self.filter_notifications(&request.app_id, request.notifications);
        if filtered.is_empty() {
            return Err(InvalidInputError::Notifications("no namespace to watch".into()).into());
        }

        let mut namespaces = BTreeSet::new();
        let mut client_ids: HashMap<String, i64> = HashMap::new();
        let mut original_names = BTreeMap::new();
        for (normalized, notification) in filtered {
            if notification.namespace_name != normalized {
                original_names.insert(normalized.clone(), notification.namespace_name.clone());
            }
            client_ids.insert(normalized.clone(), notification.notification_id);
            namespaces.insert(normalized);
        }

        let watched = self.assembler.assemble_all_watch_keys(
            &request.app_id,
            &request.cluster,
            &namespaces,
            request.data_center.as_deref(),
        );
        let watched_keys: BTreeSet<String> = watched.values().flatten().cloned().collect();

        // park before checking the cache so an event arriving in between is not lost
        let (registration, receiver) = self.registry.register(&watched_keys, original_names);
        debug!(
            app_id = %request.app_id,
            cluster = %request.cluster,
            data_center = ?request.data_center,
            client_ip = ?request.client_ip,
            keys = ?watched_keys,
            "long poll parked"
        );

        let latest: HashMap<String, i64> = self
            .messages
            .latest_per_key(&watched_keys)
            .into_iter()
            .map(|e| (e.watch_key.clone(), e.notification_id()))
            .collect();

        let changed = changed_namespaces(&namespaces, &client_ids, &watched, &latest);
        if !changed.is_empty() && registration.poll.resolve(changed) {
            LONG_POLL_RESOLUTIONS.with_label_values(&["immediate"]).inc();
        }

        match tokio::time::timeout(self.long_poll_timeout, receiver).await {
            Ok(Ok(notifications)) => Ok(PollOutcome::Changed(notifications)),
            Ok(Err(_)) | Err(_) => {
                if registration.poll.close() {
                    LONG_POLL_RESOLUTIONS.with_label_values(&["timeout"]).inc();
                }
                Ok(PollOutcome::NotModified)
            }
        }
    }

    /// Number of parked requests.
    pub fn pending_count(&self) -> usize {
        self.registry.len()
    }

    fn resolve_all(
        &self,
        polls: Vec<Arc<PendingPoll>>,
        notification: ConfigNotification,
        watch_key: &str,
    ) {
        let batch = self.notification_batch;
        if polls.len() > batch {
            if let Ok(handle) = Handle::try_current() {
                NOTIFICATION_FANOUT
                    .with_label_values(&["batched"])
                    .observe(polls.len() as f64);
                let registry = self.registry.clone();
                let interval = self.notification_batch_interval;
                let watch_key = watch_key.to_string();
                handle.spawn(async move {
                    debug!(clients = polls.len(), %watch_key, batch, "async notify clients in batches");
                    for (i, poll) in polls.iter().enumerate() {
                        if i > 0 && i % batch == 0 {
                            tokio::time::sleep(interval).await;
                        }
                        resolve_one(&registry, poll, &notification);
                    }
                });
                return;
            }
        }

        NOTIFICATION_FANOUT
            .with_label_values(&["inline"])
            .observe(polls.len() as f64);
        debug!(clients = polls.len(), %watch_key, "notify clients");
        for poll in &polls {
            resolve_one(&self.registry, poll, &notification);
        }
    }
}

fn resolve_one(
    registry: &PendingRegistry,
    poll: &PendingPoll,
    notification: &ConfigNotification,
) {
    if poll.resolve(vec![notification.clone()]) {
        LONG_POLL_RESOLUTIONS.with_label_values(&["event"]).inc();
    }
    registry.deregister(poll);
}

/// Namespaces whose best id across their watch keys is newer than the
/// client's, each carrying the ids of its keys.
fn changed_namespaces(
    namespaces: &BTreeSet<String>,
    client_ids: &HashMap<String, i64>,
    watched: &BTreeMap<String, BTreeSet<String>>,
    latest: &HashMap<String, i64>,
) -> Vec<ConfigNotification> {
    let mut changed = Vec::new();
    if latest.is_empty() {
        return changed;
    }

    for namespace in namespaces {
        let client_id = client_ids
            .get(namespace)
            .copied()
            .unwrap_or(NOTIFICATION_ID_PLACEHOLDER);
        let keys = watched.get(namespace);
        let latest_id = keys
            .into_iter()
            .flatten()
            .filter_map(|k| latest.get(k).copied())
            .max()
            .unwrap_or(NOTIFICATION_ID_PLACEHOLDER);

        if latest_id > client_id {
            let mut notification = ConfigNotification::new(namespace.clone(), latest_id);
            for key in keys.into_iter().flatten() {
                if let Some(id) = latest.get(key) {
                    notification.add_message(key.clone(), *id);
                }
            }
            changed.push(notification);
        }
    }
    changed
}

impl ReleaseListener for NotificationBroker {
    fn handle_event(
        &self,
        event: &ReleaseEvent,
    ) -> Result<()> {
        let Some(namespace) = namespace_of(&event.watch_key) else {
            error!(watch_key = %event.watch_key, "release event format invalid");
            return Ok(());
        };

        let polls = self.registry.matching(&event.watch_key);
        if polls.is_empty() {
            return Ok(());
        }
        info!(id = event.id, watch_key = %event.watch_key, clients = polls.len(), "release event matches parked long polls");

        let mut notification = ConfigNotification::new(namespace, event.notification_id());
        notification.add_message(event.watch_key.clone(), event.notification_id());
        self.resolve_all(polls, notification, &event.watch_key);
        Ok(())
    }
}
