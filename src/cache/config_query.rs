use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::constants::APPLICATION_NAMESPACE;
use crate::constants::CLUSTER_NAMESPACE_SEPARATOR;
use crate::constants::DEFAULT_CLUSTER_NAME;
use crate::constants::NO_APPID_PLACEHOLDER;
use crate::filter_namespace_name;
use crate::normalize_namespace;
use crate::ConfigResponse;
use crate::ConfigSnapshotCache;
use crate::NamespaceCatalog;
use crate::NotificationMessages;
use crate::Release;
use crate::Result;

/// A client's conditional config fetch.
#[derive(Debug, Clone, Default)]
pub struct ConfigRequest {
    pub app_id: String,
    pub cluster: String,
    pub namespace: String,
    pub data_center: Option<String>,
    pub client_ip: Option<String>,
    /// Release key of the config the client already holds
    pub release_key: Option<String>,
    pub messages: Option<NotificationMessages>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigQueryOutcome {
    Found(ConfigResponse),
    NotModified,
    NotFound,
}

/// Resolves the config served for a namespace: the app's own release with
/// cluster, data center and default fallback, layered over the release of the
/// public namespace it inherits.
pub struct ConfigQuery {
    catalog: Arc<dyn NamespaceCatalog>,
    snapshots: Arc<ConfigSnapshotCache>,
}

impl ConfigQuery {
    pub fn new(
        catalog: Arc<dyn NamespaceCatalog>,
        snapshots: Arc<ConfigSnapshotCache>,
    ) -> Self {
        Self { catalog, snapshots }
    }

    pub fn query(
        &self,
        request: &ConfigRequest,
    ) -> Result<ConfigQueryOutcome> {
        let original_namespace = request.namespace.clone();
        let namespace = filter_namespace_name(&request.namespace);
        let namespace = normalize_namespace(self.catalog.as_ref(), &request.app_id, &namespace);
        let data_center = request.data_center.as_deref();
        let messages = request.messages.as_ref();

        let mut releases: Vec<Release> = Vec::with_capacity(2);

        if let Some(own) = self.load_release(&request.app_id, &request.cluster, &namespace, data_center, messages)? {
            releases.push(own);
        }

        if !self.namespace_belongs_to_app(&request.app_id, &namespace) {
            if let Some(public) = self.find_public_release(&request.app_id, &request.cluster, &namespace, data_center, messages)? {
                releases.push(public);
            }
        }

        let Some(latest) = releases.first() else {
            debug!(
                app_id = %request.app_id,
                cluster = %request.cluster,
                namespace = %original_namespace,
                client_ip = ?request.client_ip,
                "no release found"
            );
            return Ok(ConfigQueryOutcome::NotFound);
        };

        let merged_release_key = releases
            .iter()
            .map(|r| r.release_key.as_str())
            .collect::<Vec<_>>()
            .join(CLUSTER_NAMESPACE_SEPARATOR);

        if request.release_key.as_deref() == Some(merged_release_key.as_str()) {
            return Ok(ConfigQueryOutcome::NotModified);
        }

        Ok(ConfigQueryOutcome::Found(ConfigResponse {
            app_id: request.app_id.clone(),
            cluster: latest.cluster.clone(),
            namespace_name: original_namespace,
            configurations: merge_configurations(&releases),
            release_key: merged_release_key,
        }))
    }

    fn namespace_belongs_to_app(
        &self,
        app_id: &str,
        namespace: &str,
    ) -> bool {
        if namespace == APPLICATION_NAMESPACE {
            return true;
        }
        if app_id.eq_ignore_ascii_case(NO_APPID_PLACEHOLDER) {
            return false;
        }
        self.catalog.find_by_app_id_and_namespace(app_id, namespace).is_some()
    }

    fn find_public_release(
        &self,
        app_id: &str,
        cluster: &str,
        namespace: &str,
        data_center: Option<&str>,
        messages: Option<&NotificationMessages>,
    ) -> Result<Option<Release>> {
        let Some(public) = self.catalog.find_public_namespace_by_name(namespace) else {
            return Ok(None);
        };
        if public.app_id == app_id {
            return Ok(None);
        }
        self.load_release(&public.app_id, cluster, &public.name, data_center, messages)
    }

    /// Tries the requested cluster, then the data center, then `default`.
    fn load_release(
        &self,
        app_id: &str,
        cluster: &str,
        namespace: &str,
        data_center: Option<&str>,
        messages: Option<&NotificationMessages>,
    ) -> Result<Option<Release>> {
        if app_id.eq_ignore_ascii_case(NO_APPID_PLACEHOLDER) {
            return Ok(None);
        }

        if cluster != DEFAULT_CLUSTER_NAME {
            if let Some(release) = self.snapshots.find_latest_release(app_id, cluster, namespace, messages)? {
                return Ok(Some(release));
            }
        }

        if let Some(dc) = data_center.filter(|dc| !dc.is_empty() && *dc != cluster) {
            if let Some(release) = self.snapshots.find_latest_release(app_id, dc, namespace, messages)? {
                return Ok(Some(release));
            }
        }

        self.snapshots
            .find_latest_release(app_id, DEFAULT_CLUSTER_NAME, namespace, messages)
    }
}

/// Public release first, the app's own release overriding it.
fn merge_configurations(releases: &[Release]) -> BTreeMap<String, String> {
    let mut merged = BTreeMap::new();
    for release in releases.iter().rev() {
        merged.extend(release.configurations.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}
