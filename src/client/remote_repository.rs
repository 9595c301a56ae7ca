use std::collections::BTreeMap;
use std::panic::catch_unwind;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
#[cfg(test)]
use mockall::automock;
use parking_lot::Mutex;
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::ClientContext;
use super::ConfigChangeEvent;
use super::ConfigFetch;
use super::ExponentialSchedulePolicy;
use super::HttpResponse;
use super::RateLimiter;
use crate::ClientError;
use crate::ConfigResponse;
use crate::Error;
use crate::NotificationMessages;
use crate::Result;
use crate::ServiceInstance;
use crate::CLIENT_CONFIG_LOADS;

/// Longest wait for a load permit before loading anyway
const LOAD_PERMIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Cap of the failure backoff, as a multiple of its base
const FAIL_BACKOFF_MULTIPLIER: u32 = 8;

/// Receives the per-key changes of a namespace whenever its content changes.
#[cfg_attr(test, automock)]
pub trait ConfigChangeListener: Send + Sync + 'static {
    fn on_change(
        &self,
        event: &ConfigChangeEvent,
    );
}

enum LoadOutcome {
    Loaded(ConfigResponse),
    NotModified,
}

/// Client side copy of one namespace, kept fresh by periodic refresh and
/// long-poll notifications.
pub struct RemoteConfigRepository {
    namespace: String,
    ctx: ClientContext,

    config_cache: ArcSwapOption<ConfigResponse>,
    remote_messages: ArcSwapOption<NotificationMessages>,
    /// Server that announced the latest change, tried first once
    long_poll_service: ArcSwapOption<ServiceInstance>,
    force_refresh: AtomicBool,

    rate_limiter: RateLimiter,
    fail_policy: Mutex<ExponentialSchedulePolicy>,
    sync_lock: tokio::sync::Mutex<()>,
    listeners: RwLock<Vec<Arc<dyn ConfigChangeListener>>>,
}

impl std::fmt::Debug for RemoteConfigRepository {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("RemoteConfigRepository")
            .field("namespace", &self.namespace)
            .field("release_key", &self.config_cache.load().as_ref().map(|c| c.release_key.clone()))
            .finish()
    }
}

impl RemoteConfigRepository {
    pub fn new(
        namespace: impl Into<String>,
        ctx: ClientContext,
    ) -> Self {
        let base = ctx.retry.config_load.base_delay();
        let rate_limiter = RateLimiter::new(ctx.config.load_config_qps);
        Self {
            namespace: namespace.into(),
            ctx,
            config_cache: ArcSwapOption::empty(),
            remote_messages: ArcSwapOption::empty(),
            long_poll_service: ArcSwapOption::empty(),
            force_refresh: AtomicBool::new(true),
            rate_limiter,
            fail_policy: Mutex::new(ExponentialSchedulePolicy::new(base, base * FAIL_BACKOFF_MULTIPLIER)),
            sync_lock: tokio::sync::Mutex::new(()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Last config held in memory, either fetched or restored from the local
    /// file cache.
    pub fn current(&self) -> Option<Arc<ConfigResponse>> {
        self.config_cache.load_full()
    }

    /// Configuration of the namespace, synchronizing first if nothing is held
    /// yet.
    pub async fn get_config(&self) -> Result<BTreeMap<String, String>> {
        if let Some(config) = self.current() {
            return Ok(config.configurations.clone());
        }
        self.sync().await?;
        self.current()
            .map(|c| c.configurations.clone())
            .ok_or_else(|| self.not_found())
    }

    pub fn add_change_listener(
        &self,
        listener: Arc<dyn ConfigChangeListener>,
    ) {
        self.listeners.write().push(listener);
    }

    /// Remembers the announcing server and merged ids, then force-syncs in
    /// the background.
    pub fn on_long_poll_notified(
        self: &Arc<Self>,
        service: ServiceInstance,
        messages: Option<NotificationMessages>,
    ) {
        self.long_poll_service.store(Some(Arc::new(service)));
        if let Some(messages) = messages {
            let mut merged = self
                .remote_messages
                .load_full()
                .map(|m| m.as_ref().clone())
                .unwrap_or_default();
            merged.merge_from(&messages);
            self.remote_messages.store(Some(Arc::new(merged)));
        }
        self.force_refresh.store(true, Ordering::Release);

        let repository = self.clone();
        tokio::spawn(async move {
            if let Err(e) = repository.sync().await {
                warn!(namespace = %repository.namespace, ?e, "sync after long poll notification failed");
            }
        });
    }

    /// Refreshes the namespace every `refresh_interval_in_ms` until shutdown.
    pub fn start_periodic_refresh(
        self: &Arc<Self>,
        mut shutdown: watch::Receiver<()>,
    ) -> JoinHandle<()> {
        let repository = self.clone();
        let period = Duration::from_millis(self.ctx.config.refresh_interval_in_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        debug!(namespace = %repository.namespace, "periodic refresh stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = repository.sync().await {
                            warn!(namespace = %repository.namespace, ?e, "periodic refresh failed");
                        }
                    }
                }
            }
        })
    }

    /// Fetches the namespace and applies the result. Concurrent calls run one
    /// after another.
    pub async fn sync(&self) -> Result<()> {
        let _guard = self.sync_lock.lock().await;

        match self.load_config().await {
            Ok(LoadOutcome::NotModified) => Ok(()),
            Ok(LoadOutcome::Loaded(config)) => {
                self.apply(config, true);
                Ok(())
            }
            Err(e) if e.is_not_found() => Err(e),
            Err(e) => {
                if self.config_cache.load().is_some() {
                    return Err(e);
                }
                warn!(namespace = %self.namespace, ?e, "remote load failed, trying local cache file");
                let config = &self.ctx.config;
                let configurations = self
                    .ctx
                    .local_cache
                    .load(&config.app_id, &config.cluster, &self.namespace)
                    .map_err(|local| {
                        warn!(namespace = %self.namespace, ?local, "local cache file unavailable");
                        e
                    })?;
                info!(namespace = %self.namespace, "serving config from local cache file");
                CLIENT_CONFIG_LOADS
                    .with_label_values(&[self.namespace.as_str(), "local_cache"])
                    .inc();
                self.apply(
                    ConfigResponse {
                        app_id: config.app_id.clone(),
                        cluster: config.cluster.clone(),
                        namespace_name: self.namespace.clone(),
                        configurations,
                        release_key: String::new(),
                    },
                    false,
                );
                Ok(())
            }
        }
    }

    fn apply(
        &self,
        config: ConfigResponse,
        persist: bool,
    ) {
        let previous = self.config_cache.load_full();
        if previous.as_deref() == Some(&config) {
            return;
        }

        debug!(namespace = %self.namespace, release_key = %config.release_key, "config changed");
        if persist {
            let _ = self.ctx.local_cache.persist(
                &config.app_id,
                &config.cluster,
                &self.namespace,
                &config.configurations,
            );
        }

        let config = Arc::new(config);
        self.config_cache.store(Some(config.clone()));

        let event = ConfigChangeEvent::between(
            &self.namespace,
            previous.as_deref().map(|p| &p.configurations),
            &config.configurations,
        );
        if event.is_empty() {
            return;
        }
        let listeners: Vec<Arc<dyn ConfigChangeListener>> = self.listeners.read().clone();
        for (index, listener) in listeners.iter().enumerate() {
            let notified = catch_unwind(AssertUnwindSafe(|| listener.on_change(&event)));
            if notified.is_err() {
                error!(namespace = %self.namespace, listener = index, "change listener panicked");
            }
        }
    }

    async fn load_config(&self) -> Result<LoadOutcome> {
        if !self.rate_limiter.try_acquire(LOAD_PERMIT_TIMEOUT).await {
            warn!(namespace = %self.namespace, "load config rate limited, waiting {:?}", LOAD_PERMIT_TIMEOUT);
            tokio::time::sleep(LOAD_PERMIT_TIMEOUT).await;
        }

        let force = self.force_refresh.load(Ordering::Acquire);
        let passes = if force { 2 } else { 1 };
        let mut attempts = 0usize;
        let mut only_not_found = true;
        let mut last_url = None;
        let mut last_reason = String::from("no attempt made");

        for _ in 0..passes {
            if !self.force_refresh.load(Ordering::Acquire) {
                let delay = self.fail_policy.lock().current();
                if !delay.is_zero() {
                    debug!(namespace = %self.namespace, ?delay, "backing off before loading config");
                    tokio::time::sleep(delay).await;
                }
            }

            let mut services = self.ctx.locator.get_services().await?;
            services.shuffle(&mut rand::thread_rng());
            if let Some(announcer) = self.long_poll_service.swap(None) {
                services.insert(0, announcer.as_ref().clone());
            }

            for service in services {
                attempts += 1;
                let request = self.build_fetch();
                match self
                    .ctx
                    .transport
                    .fetch_config(service.homepage_url.clone(), request)
                    .await
                {
                    Ok(HttpResponse::NotModified) => {
                        self.record_success("not_modified");
                        return Ok(LoadOutcome::NotModified);
                    }
                    Ok(HttpResponse::Ok(config)) => {
                        self.record_success("loaded");
                        return Ok(LoadOutcome::Loaded(config));
                    }
                    Err(e) => {
                        if e.status_code() == Some(404) {
                            debug!(namespace = %self.namespace, url = %service.homepage_url, "namespace not released on server");
                        } else {
                            only_not_found = false;
                            warn!(namespace = %self.namespace, url = %service.homepage_url, ?e, "load config failed");
                        }
                        last_reason = e.to_string();
                        last_url = Some(service.homepage_url);
                    }
                }
            }

            let delay = self.fail_policy.lock().fail();
            debug!(namespace = %self.namespace, ?delay, "load config pass failed");
        }

        if attempts > 0 && only_not_found {
            CLIENT_CONFIG_LOADS.with_label_values(&[self.namespace.as_str(), "not_found"]).inc();
            return Err(self.not_found());
        }

        CLIENT_CONFIG_LOADS.with_label_values(&[self.namespace.as_str(), "failed"]).inc();
        let config = &self.ctx.config;
        Err(Error::from(ClientError::LoadFailed {
            app_id: config.app_id.clone(),
            cluster: config.cluster.clone(),
            namespace: self.namespace.clone(),
            url: last_url,
            reason: last_reason,
        }))
    }

    fn build_fetch(&self) -> ConfigFetch {
        let config = &self.ctx.config;
        ConfigFetch {
            app_id: config.app_id.clone(),
            cluster: config.cluster.clone(),
            namespace: self.namespace.clone(),
            release_key: self.config_cache.load().as_ref().map(|c| c.release_key.clone()),
            data_center: config.data_center.clone(),
            ip: config.local_ip.clone(),
            messages: self.remote_messages.load_full().map(|m| m.as_ref().clone()),
        }
    }

    fn record_success(
        &self,
        outcome: &str,
    ) {
        self.fail_policy.lock().success();
        self.force_refresh.store(false, Ordering::Release);
        CLIENT_CONFIG_LOADS.with_label_values(&[self.namespace.as_str(), outcome]).inc();
    }

    fn not_found(&self) -> Error {
        let config = &self.ctx.config;
        ClientError::NotFound {
            app_id: config.app_id.clone(),
            cluster: config.cluster.clone(),
            namespace: self.namespace.clone(),
        }
        .into()
    }
}
