//! Namespace metadata lookup and client namespace name normalization.

use dashmap::DashMap;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::CLUSTER_NAMESPACE_SEPARATOR;
use crate::constants::PROPERTIES_SUFFIX;

/// A namespace declared by an app. Public namespaces can be watched by any app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppNamespace {
    pub app_id: String,
    pub name: String,
    pub is_public: bool,
}

impl AppNamespace {
    pub fn private(
        app_id: &str,
        name: &str,
    ) -> Self {
        Self {
            app_id: app_id.to_string(),
            name: name.to_string(),
            is_public: false,
        }
    }

    pub fn public(
        app_id: &str,
        name: &str,
    ) -> Self {
        Self {
            app_id: app_id.to_string(),
            name: name.to_string(),
            is_public: true,
        }
    }
}

/// Read access to namespace metadata owned by the admin side.
///
/// All lookups are case-insensitive and return the canonical name.
#[cfg_attr(test, automock)]
pub trait NamespaceCatalog: Send + Sync + 'static {
    fn find_by_app_id_and_namespace(
        &self,
        app_id: &str,
        namespace: &str,
    ) -> Option<AppNamespace>;

    fn find_public_namespace_by_name(
        &self,
        namespace: &str,
    ) -> Option<AppNamespace>;

    fn find_by_app_id_and_namespaces(
        &self,
        app_id: &str,
        namespaces: &[String],
    ) -> Vec<AppNamespace>;

    fn find_public_namespaces_by_names(
        &self,
        namespaces: &[String],
    ) -> Vec<AppNamespace>;
}

/// Catalog kept in process memory, filled by [`InMemoryNamespaceCatalog::register`].
#[derive(Debug, Default)]
pub struct InMemoryNamespaceCatalog {
    by_app: DashMap<String, AppNamespace>,
    public: DashMap<String, AppNamespace>,
}

impl InMemoryNamespaceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        namespace: AppNamespace,
    ) {
        if namespace.is_public {
            self.public.insert(namespace.name.to_lowercase(), namespace.clone());
        }
        self.by_app.insert(app_key(&namespace.app_id, &namespace.name), namespace);
    }

    pub fn remove(
        &self,
        app_id: &str,
        namespace: &str,
    ) -> Option<AppNamespace> {
        let removed = self.by_app.remove(&app_key(app_id, namespace)).map(|(_, v)| v)?;
        if removed.is_public {
            self.public.remove_if(&removed.name.to_lowercase(), |_, v| v.app_id == removed.app_id);
        }
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.by_app.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_app.is_empty()
    }
}

impl NamespaceCatalog for InMemoryNamespaceCatalog {
    fn find_by_app_id_and_namespace(
        &self,
        app_id: &str,
        namespace: &str,
    ) -> Option<AppNamespace> {
        self.by_app.get(&app_key(app_id, namespace)).map(|e| e.value().clone())
    }

    fn find_public_namespace_by_name(
        &self,
        namespace: &str,
    ) -> Option<AppNamespace> {
        self.public.get(&namespace.to_lowercase()).map(|e| e.value().clone())
    }

    fn find_by_app_id_and_namespaces(
        &self,
        app_id: &str,
        namespaces: &[String],
    ) -> Vec<AppNamespace> {
        namespaces
            .iter()
            .filter_map(|ns| self.find_by_app_id_and_namespace(app_id, ns))
            .collect()
    }

    fn find_public_namespaces_by_names(
        &self,
        namespaces: &[String],
    ) -> Vec<AppNamespace> {
        namespaces
            .iter()
            .filter_map(|ns| self.find_public_namespace_by_name(ns))
            .collect()
    }
}

fn app_key(
    app_id: &str,
    namespace: &str,
) -> String {
    format!("{app_id}{CLUSTER_NAMESPACE_SEPARATOR}{namespace}").to_lowercase()
}

/// Strips a trailing `.properties` (any case) from a client namespace name.
pub fn filter_namespace_name(namespace: &str) -> String {
    let len = namespace.len();
    let suffix_len = PROPERTIES_SUFFIX.len();
    if len > suffix_len
        && namespace.is_char_boundary(len - suffix_len)
        && namespace[len - suffix_len..].eq_ignore_ascii_case(PROPERTIES_SUFFIX)
    {
        namespace[..len - suffix_len].to_string()
    } else {
        namespace.to_string()
    }
}

/// Maps a client namespace name to its canonical spelling: the app's own
/// namespace first, then a public namespace, else the input unchanged.
pub fn normalize_namespace(
    catalog: &dyn NamespaceCatalog,
    app_id: &str,
    namespace: &str,
) -> String {
    if let Some(own) = catalog.find_by_app_id_and_namespace(app_id, namespace) {
        return own.name;
    }

    if let Some(public) = catalog.find_public_namespace_by_name(namespace) {
        return public.name;
    }

    namespace.to_string()
}
