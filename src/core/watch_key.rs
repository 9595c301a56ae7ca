//! Watch keys identify what a release event invalidates: `appId+cluster+namespace`.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::constants::APPLICATION_NAMESPACE;
use crate::constants::CLUSTER_NAMESPACE_SEPARATOR;
use crate::constants::DEFAULT_CLUSTER_NAME;
use crate::constants::NO_APPID_PLACEHOLDER;
use crate::InvalidInputError;
use crate::NamespaceCatalog;
use crate::Result;

/// Parsed form of a watch key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchKey {
    pub app_id: String,
    pub cluster: String,
    pub namespace: String,
}

impl WatchKey {
    pub fn new(
        app_id: &str,
        cluster: &str,
        namespace: &str,
    ) -> Self {
        Self {
            app_id: app_id.to_string(),
            cluster: cluster.to_string(),
            namespace: namespace.to_string(),
        }
    }

    /// Splits on `+`, ignoring empty segments. Anything but three segments is malformed.
    pub fn parse(key: &str) -> Result<Self> {
        let parts: Vec<&str> = key
            .split(CLUSTER_NAMESPACE_SEPARATOR)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        match parts.as_slice() {
            [app_id, cluster, namespace] => Ok(Self::new(app_id, cluster, namespace)),
            _ => Err(InvalidInputError::WatchKey(key.to_string()).into()),
        }
    }
}

impl fmt::Display for WatchKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.app_id,
            self.cluster,
            self.namespace,
            sep = CLUSTER_NAMESPACE_SEPARATOR
        )
    }
}

pub fn assemble_key(
    app_id: &str,
    cluster: &str,
    namespace: &str,
) -> String {
    WatchKey::new(app_id, cluster, namespace).to_string()
}

/// Namespace segment of a watch key, `None` when the key is malformed.
pub fn namespace_of(key: &str) -> Option<String> {
    WatchKey::parse(key).ok().map(|k| k.namespace)
}

/// Computes which watch keys a `(appId, cluster, namespace, dataCenter)` request observes.
///
/// Membership is derived from the catalog on every call.
#[derive(Clone)]
pub struct WatchKeysAssembler {
    catalog: Arc<dyn NamespaceCatalog>,
}

impl WatchKeysAssembler {
    pub fn new(catalog: Arc<dyn NamespaceCatalog>) -> Self {
        Self { catalog }
    }

    pub fn assemble_watch_keys(
        &self,
        app_id: &str,
        cluster: &str,
        namespace: &str,
        data_center: Option<&str>,
    ) -> BTreeSet<String> {
        let namespaces = BTreeSet::from([namespace.to_string()]);
        self.assemble_all_watch_keys(app_id, cluster, &namespaces, data_center)
            .remove(namespace)
            .unwrap_or_default()
    }

    /// Returns `namespace -> watch keys`. Namespaces without any key are absent.
    pub fn assemble_all_watch_keys(
        &self,
        app_id: &str,
        cluster: &str,
        namespaces: &BTreeSet<String>,
        data_center: Option<&str>,
    ) -> BTreeMap<String, BTreeSet<String>> {
        let mut watched: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        if !is_placeholder(app_id) {
            for ns in namespaces {
                watched
                    .entry(ns.clone())
                    .or_default()
                    .extend(keys_for_app(app_id, cluster, ns, data_center));
            }
        }

        // every app owns `application`, nothing public to look up
        if namespaces.len() == 1 && namespaces.contains(APPLICATION_NAMESPACE) {
            return watched;
        }

        let owned = self.namespaces_belong_to_app(app_id, namespaces);
        let public: Vec<String> = namespaces.iter().filter(|ns| !owned.contains(*ns)).cloned().collect();
        if public.is_empty() {
            return watched;
        }

        for app_namespace in self.catalog.find_public_namespaces_by_names(&public) {
            if app_namespace.app_id == app_id {
                continue;
            }
            watched
                .entry(app_namespace.name.clone())
                .or_default()
                .extend(keys_for_app(&app_namespace.app_id, cluster, &app_namespace.name, data_center));
        }

        watched
    }

    fn namespaces_belong_to_app(
        &self,
        app_id: &str,
        namespaces: &BTreeSet<String>,
    ) -> BTreeSet<String> {
        if is_placeholder(app_id) {
            return BTreeSet::new();
        }
        let requested: Vec<String> = namespaces.iter().cloned().collect();
        let mut owned: BTreeSet<String> = self
            .catalog
            .find_by_app_id_and_namespaces(app_id, &requested)
            .into_iter()
            .map(|ns| ns.name)
            .collect();
        if namespaces.contains(APPLICATION_NAMESPACE) {
            owned.insert(APPLICATION_NAMESPACE.to_string());
        }
        owned
    }
}

fn is_placeholder(app_id: &str) -> bool {
    app_id.eq_ignore_ascii_case(NO_APPID_PLACEHOLDER)
}

fn keys_for_app(
    app_id: &str,
    cluster: &str,
    namespace: &str,
    data_center: Option<&str>,
) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();

    if cluster != DEFAULT_CLUSTER_NAME {
        keys.insert(assemble_key(app_id, cluster, namespace));
    }

    if let Some(dc) = data_center.filter(|dc| !dc.is_empty() && *dc != cluster) {
        keys.insert(assemble_key(app_id, dc, namespace));
    }

    keys.insert(assemble_key(app_id, DEFAULT_CLUSTER_NAME, namespace));
    keys
}
