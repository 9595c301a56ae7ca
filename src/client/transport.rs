//! HTTP calls made by the client library.

use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::StatusCode;
use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::ClientConfig;
use crate::ConfigNotification;
use crate::ConfigResponse;
use crate::Error;
use crate::NetworkError;
use crate::NotificationMessages;
use crate::Result;
use crate::RetryPolicies;
use crate::ServiceInstance;

/// Body of a `200`, or `304 Not Modified`. Every other status is an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpResponse<T> {
    Ok(T),
    NotModified,
}

/// Conditional fetch of one namespace's config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFetch {
    pub app_id: String,
    pub cluster: String,
    pub namespace: String,
    pub release_key: Option<String>,
    pub data_center: Option<String>,
    pub ip: Option<String>,
    pub messages: Option<NotificationMessages>,
}

/// One long-poll round covering every watched namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationsPoll {
    pub app_id: String,
    pub cluster: String,
    pub notifications: Vec<ConfigNotification>,
    pub data_center: Option<String>,
    pub ip: Option<String>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConfigTransport: Send + Sync + 'static {
    /// `GET {service_url}/configs/{appId}/{cluster}/{namespace}`
    async fn fetch_config(
        &self,
        service_url: String,
        request: ConfigFetch,
    ) -> Result<HttpResponse<ConfigResponse>>;

    /// `GET {service_url}/notifications/v2`
    async fn poll_notifications(
        &self,
        service_url: String,
        request: NotificationsPoll,
    ) -> Result<HttpResponse<Vec<ConfigNotification>>>;

    /// `GET {meta_url}/services/config`
    async fn discover_services(
        &self,
        meta_url: String,
        app_id: String,
        ip: Option<String>,
    ) -> Result<Vec<ServiceInstance>>;
}

/// [`ConfigTransport`] over reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    request_timeout: Duration,
    long_poll_timeout: Duration,
    discovery_timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(
        config: &ClientConfig,
        retry: &RetryPolicies,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_in_ms))
            .build()
            .map_err(|e| NetworkError::Request {
                url: String::new(),
                source: Box::new(e),
            })?;

        Ok(Self {
            client,
            request_timeout: retry.config_load.timeout(),
            long_poll_timeout: retry.long_poll.timeout(),
            discovery_timeout: retry.discovery.timeout(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        timeout: Duration,
    ) -> Result<HttpResponse<T>> {
        let target = url.to_string();
        debug!(url = %target, "sending request");

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| request_error(&target, timeout, e))?;

        match response.status() {
            StatusCode::NOT_MODIFIED => Ok(HttpResponse::NotModified),
            status if status.is_success() => {
                let body = response
                    .json::<T>()
                    .await
                    .map_err(|e| request_error(&target, timeout, e))?;
                Ok(HttpResponse::Ok(body))
            }
            status => Err(NetworkError::UnexpectedStatus {
                url: target,
                status: status.as_u16(),
            }
            .into()),
        }
    }
}

#[async_trait]
impl ConfigTransport for ReqwestTransport {
    async fn fetch_config(
        &self,
        service_url: String,
        request: ConfigFetch,
    ) -> Result<HttpResponse<ConfigResponse>> {
        let mut query = Vec::new();
        if let Some(release_key) = request.release_key.filter(|k| !k.is_empty()) {
            query.push(("releaseKey", release_key));
        }
        if let Some(dc) = request.data_center.filter(|dc| !dc.is_empty()) {
            query.push(("dataCenter", dc));
        }
        if let Some(ip) = request.ip.filter(|ip| !ip.is_empty()) {
            query.push(("ip", ip));
        }
        if let Some(messages) = request.messages {
            query.push(("messages", serde_json::to_string(&messages)?));
        }

        let url = build_url(
            &service_url,
            &["configs", &request.app_id, &request.cluster, &request.namespace],
            &query,
        )?;
        self.get_json(url, self.request_timeout).await
    }

    async fn poll_notifications(
        &self,
        service_url: String,
        request: NotificationsPoll,
    ) -> Result<HttpResponse<Vec<ConfigNotification>>> {
        let mut query = vec![
            ("appId", request.app_id),
            ("cluster", request.cluster),
            ("notifications", serde_json::to_string(&request.notifications)?),
        ];
        if let Some(dc) = request.data_center.filter(|dc| !dc.is_empty()) {
            query.push(("dataCenter", dc));
        }
        if let Some(ip) = request.ip.filter(|ip| !ip.is_empty()) {
            query.push(("ip", ip));
        }

        let url = build_url(&service_url, &["notifications", "v2"], &query)?;
        self.get_json(url, self.long_poll_timeout).await
    }

    async fn discover_services(
        &self,
        meta_url: String,
        app_id: String,
        ip: Option<String>,
    ) -> Result<Vec<ServiceInstance>> {
        let mut query = vec![("appId", app_id)];
        if let Some(ip) = ip.filter(|ip| !ip.is_empty()) {
            query.push(("ip", ip));
        }

        let url = build_url(&meta_url, &["services", "config"], &query)?;
        match self.get_json(url, self.discovery_timeout).await? {
            HttpResponse::Ok(services) => Ok(services),
            HttpResponse::NotModified => Ok(Vec::new()),
        }
    }
}

/// Appends escaped path `segments` to `base` and sets the query.
pub(crate) fn build_url(
    base: &str,
    segments: &[&str],
    query: &[(&str, String)],
) -> Result<Url> {
    let mut url = Url::parse(base).map_err(|e| NetworkError::InvalidUrl(format!("{base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| NetworkError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);

    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query {
            pairs.append_pair(key, value);
        }
    }
    Ok(url)
}

fn request_error(
    url: &str,
    timeout: Duration,
    e: reqwest::Error,
) -> Error {
    if e.is_timeout() {
        NetworkError::Timeout {
            url: url.to_string(),
            duration: timeout,
        }
        .into()
    } else {
        NetworkError::Request {
            url: url.to_string(),
            source: Box::new(e),
        }
        .into()
    }
}
