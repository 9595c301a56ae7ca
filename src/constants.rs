// -
// Watch keys and namespaces

/// Joins `appId`, `cluster` and `namespace` into a watch key
pub const CLUSTER_NAMESPACE_SEPARATOR: &str = "+";

pub const DEFAULT_CLUSTER_NAME: &str = "default";

/// Every app owns this namespace implicitly
pub const APPLICATION_NAMESPACE: &str = "application";

/// Clients without an app id send this placeholder; it watches nothing
pub const NO_APPID_PLACEHOLDER: &str = "RelayNoAppIdPlaceHolder";

/// Notification id of a namespace the client has never seen
pub const NOTIFICATION_ID_PLACEHOLDER: i64 = -1;

pub const PROPERTIES_SUFFIX: &str = ".properties";

// -
// Release log

/// Sled database tree namespaces
pub(crate) const RELEASE_LOG_TREE: &str = "_release_log";
pub(crate) const RELEASE_LOG_INDEX_TREE: &str = "_release_log_by_key";
pub(crate) const RELEASE_LOG_META_TREE: &str = "_release_log_meta";

/// Page size used by scans over the release log
pub const SCAN_PAGE_SIZE: usize = 500;

/// Page size used when deleting superseded events
pub const COMPACTION_PAGE_SIZE: usize = 100;

// -
// Client

/// Environment variable holding a static list of config service urls
pub const CONFIG_SERVICE_ENV: &str = "RELAY_CONFIG_SERVICE";

/// Key holding a static list of config service urls in `server.properties`
pub const CONFIG_SERVICE_PROPERTY: &str = "config_service";

pub const CONFIG_SERVICE_APP_NAME: &str = "config-relay-service";

pub(crate) const LOCAL_CACHE_FILE_HEADER: &str = "# Persisted by config-relay";
