//! Client side of the notification long poll.
//!
//! One loop per client watches every submitted namespace with a single
//! request and pushes change announcements to the owning repositories.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::ClientContext;
use super::ExponentialSchedulePolicy;
use super::HttpResponse;
use super::NotificationsPoll;
use super::RateLimiter;
use super::RemoteConfigRepository;
use crate::constants::NOTIFICATION_ID_PLACEHOLDER;
use crate::constants::PROPERTIES_SUFFIX;
use crate::utils::async_task::sleep_or_shutdown;
use crate::ClientError;
use crate::ConfigNotification;
use crate::NotificationMessages;
use crate::Result;
use crate::ServiceInstance;

/// Longest wait for a poll permit before polling anyway
const POLL_PERMIT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RemoteLongPollService {
    ctx: ClientContext,
    notifications: DashMap<String, i64>,
    remote_messages: DashMap<String, NotificationMessages>,
    repositories: DashMap<String, Vec<Arc<RemoteConfigRepository>>>,
    started: AtomicBool,
    /// Server of the previous round, reused until it answers 304 or fails
    last_service: ArcSwapOption<ServiceInstance>,
    rate_limiter: RateLimiter,
    policy: Mutex<ExponentialSchedulePolicy>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for RemoteLongPollService {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("RemoteLongPollService")
            .field("namespaces", &self.notifications.len())
            .field("started", &self.started.load(Ordering::Relaxed))
            .finish()
    }
}

impl RemoteLongPollService {
    pub fn new(ctx: ClientContext) -> Self {
        let policy = ctx.retry.long_poll;
        let rate_limiter = RateLimiter::new(ctx.config.long_poll_qps);
        Self {
            ctx,
            notifications: DashMap::new(),
            remote_messages: DashMap::new(),
            repositories: DashMap::new(),
            started: AtomicBool::new(false),
            last_service: ArcSwapOption::empty(),
            rate_limiter,
            policy: Mutex::new(ExponentialSchedulePolicy::new(policy.base_delay(), policy.max_delay())),
            handle: Mutex::new(None),
        }
    }

    /// Watches `namespace` on behalf of `repository`. The poll loop is
    /// started by the first submission.
    pub fn submit(
        self: &Arc<Self>,
        namespace: &str,
        repository: Arc<RemoteConfigRepository>,
        shutdown: watch::Receiver<()>,
    ) {
        self.repositories
            .entry(namespace.to_string())
            .or_default()
            .push(repository);
        self.notifications
            .entry(namespace.to_string())
            .or_insert(NOTIFICATION_ID_PLACEHOLDER);

        if !self.started.swap(true, Ordering::AcqRel) {
            let service = self.clone();
            let handle = tokio::spawn(async move { service.run(shutdown).await });
            *self.handle.lock() = Some(handle);
        }
    }

    /// Last notification id seen for `namespace`.
    pub fn notification_id(
        &self,
        namespace: &str,
    ) -> Option<i64> {
        self.notifications.get(namespace).map(|id| *id)
    }

    pub fn remote_messages(
        &self,
        namespace: &str,
    ) -> Option<NotificationMessages> {
        self.remote_messages.get(namespace).map(|m| m.clone())
    }

    pub fn take_handle(&self) -> Option<JoinHandle<()>> {
        self.handle.lock().take()
    }

    async fn run(
        &self,
        mut shutdown: watch::Receiver<()>,
    ) {
        let initial_delay = Duration::from_millis(self.ctx.config.long_poll_initial_delay_in_ms);
        if sleep_or_shutdown(initial_delay, &mut shutdown).await {
            return;
        }
        info!(app_id = %self.ctx.config.app_id, "long polling started");

        loop {
            if !self.rate_limiter.try_acquire(POLL_PERMIT_TIMEOUT).await
                && sleep_or_shutdown(POLL_PERMIT_TIMEOUT, &mut shutdown).await
            {
                break;
            }

            let outcome = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                outcome = self.poll_once() => outcome,
            };

            if let Err(e) = outcome {
                self.last_service.store(None);
                let delay = self.policy.lock().fail();
                warn!(?e, ?delay, "long polling failed, backing off");
                if sleep_or_shutdown(delay, &mut shutdown).await {
                    break;
                }
            }
        }
        info!("long polling stopped");
    }

    /// One long-poll round against one server.
    pub(crate) async fn poll_once(&self) -> Result<()> {
        let service = match self.last_service.load_full() {
            Some(service) => service,
            None => {
                let services = self.ctx.locator.get_services().await?;
                let chosen = services
                    .choose(&mut rand::thread_rng())
                    .cloned()
                    .ok_or(ClientError::NoServiceAvailable)?;
                let chosen = Arc::new(chosen);
                self.last_service.store(Some(chosen.clone()));
                chosen
            }
        };

        let request = NotificationsPoll {
            app_id: self.ctx.config.app_id.clone(),
            cluster: self.ctx.config.cluster.clone(),
            notifications: self.assemble_notifications(),
            data_center: self.ctx.config.data_center.clone(),
            ip: self.ctx.config.local_ip.clone(),
        };
        debug!(url = %service.homepage_url, "long polling");

        let response = self
            .ctx
            .transport
            .poll_notifications(service.homepage_url.clone(), request)
            .await?;
        self.policy.lock().success();

        match response {
            HttpResponse::Ok(notifications) => {
                self.update_notifications(&notifications);
                self.update_remote_messages(&notifications);
                self.notify(&service, &notifications);
            }
            HttpResponse::NotModified => {
                if rand::random::<bool>() {
                    self.last_service.store(None);
                }
            }
        }
        Ok(())
    }

    fn assemble_notifications(&self) -> Vec<ConfigNotification> {
        self.notifications
            .iter()
            .map(|entry| ConfigNotification::new(entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Ids only move forward, for the name and its `.properties` alias.
    fn update_notifications(
        &self,
        notifications: &[ConfigNotification],
    ) {
        for notification in notifications {
            let name = &notification.namespace_name;
            for alias in [name.clone(), format!("{name}{PROPERTIES_SUFFIX}")] {
                if let Some(mut id) = self.notifications.get_mut(&alias) {
                    if notification.notification_id > *id {
                        *id = notification.notification_id;
                    }
                }
            }
        }
    }

    fn update_remote_messages(
        &self,
        notifications: &[ConfigNotification],
    ) {
        for notification in notifications {
            if let Some(messages) = &notification.messages {
                self.remote_messages
                    .entry(notification.namespace_name.clone())
                    .or_default()
                    .merge_from(messages);
            }
        }
    }

    fn notify(
        &self,
        service: &ServiceInstance,
        notifications: &[ConfigNotification],
    ) {
        for notification in notifications {
            let name = &notification.namespace_name;
            let messages = self.remote_messages.get(name).map(|m| m.clone());

            let mut targets: Vec<Arc<RemoteConfigRepository>> = Vec::new();
            for alias in [name.clone(), format!("{name}{PROPERTIES_SUFFIX}")] {
                if let Some(repositories) = self.repositories.get(&alias) {
                    targets.extend(repositories.iter().cloned());
                }
            }

            for repository in targets {
                debug!(namespace = %repository.namespace(), id = notification.notification_id, "namespace changed");
                repository.on_long_poll_notified(service.clone(), messages.clone());
            }
        }
    }
}
