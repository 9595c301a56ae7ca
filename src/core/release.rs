use std::collections::BTreeMap;

use dashmap::DashMap;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;

use crate::assemble_key;
use crate::Result;

/// The active configuration of one `(app, cluster, namespace)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub app_id: String,
    pub cluster: String,
    pub namespace: String,
    pub release_key: String,
    pub configurations: BTreeMap<String, String>,
}

impl Release {
    pub fn watch_key(&self) -> String {
        assemble_key(&self.app_id, &self.cluster, &self.namespace)
    }
}

/// Source of the currently active releases, owned by the admin side.
#[cfg_attr(test, automock)]
pub trait ReleaseSource: Send + Sync + 'static {
    fn find_latest_active_release(
        &self,
        app_id: &str,
        cluster: &str,
        namespace: &str,
    ) -> Result<Option<Release>>;
}

/// Release source kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryReleaseSource {
    releases: DashMap<String, Release>,
}

impl InMemoryReleaseSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `release` the active one of its namespace and returns its watch key.
    pub fn put(
        &self,
        release: Release,
    ) -> String {
        let key = release.watch_key();
        self.releases.insert(key.clone(), release);
        key
    }

    pub fn remove(
        &self,
        app_id: &str,
        cluster: &str,
        namespace: &str,
    ) -> Option<Release> {
        self.releases.remove(&assemble_key(app_id, cluster, namespace)).map(|(_, r)| r)
    }
}

impl ReleaseSource for InMemoryReleaseSource {
    fn find_latest_active_release(
        &self,
        app_id: &str,
        cluster: &str,
        namespace: &str,
    ) -> Result<Option<Release>> {
        Ok(self
            .releases
            .get(&assemble_key(app_id, cluster, namespace))
            .map(|r| r.value().clone()))
    }
}

/// Body of a successful config fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    pub app_id: String,
    pub cluster: String,
    pub namespace_name: String,
    #[serde(default)]
    pub configurations: BTreeMap<String, String>,
    pub release_key: String,
}

/// A config service endpoint advertised through discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstance {
    pub app_name: String,
    pub instance_id: String,
    pub homepage_url: String,
}

impl ServiceInstance {
    pub fn from_url(
        app_name: &str,
        url: &str,
    ) -> Self {
        let url = url.trim();
        Self {
            app_name: app_name.to_string(),
            instance_id: url.to_string(),
            homepage_url: url.to_string(),
        }
    }
}
