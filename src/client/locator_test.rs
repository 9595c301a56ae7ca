use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serial_test::serial;

use super::*;
use crate::constants::CONFIG_SERVICE_ENV;
use crate::test_utils::enable_logger;
use crate::BackoffPolicy;
use crate::ClientConfig;
use crate::ClientError;
use crate::Error;
use crate::RetryPolicies;
use crate::ServiceInstance;

fn client_config(config_service: Option<&str>) -> ClientConfig {
    ClientConfig {
        app_id: "a".to_string(),
        meta_server_url: "http://meta:8080".to_string(),
        config_service: config_service.map(str::to_string),
        server_properties_path: "/nonexistent/server.properties".into(),
        discovery_refresh_interval_in_ms: 1000,
        ..ClientConfig::default()
    }
}

fn retry() -> RetryPolicies {
    RetryPolicies {
        discovery: BackoffPolicy {
            max_retries: 2,
            timeout_ms: 100,
            base_delay_ms: 10,
            max_delay_ms: 10,
        },
        ..RetryPolicies::default()
    }
}

fn instance(url: &str) -> ServiceInstance {
    ServiceInstance::from_url("config-relay-service", url)
}

fn urls(services: &[ServiceInstance]) -> Vec<String> {
    services.iter().map(|s| s.homepage_url.clone()).collect()
}

fn untouched_transport() -> Arc<dyn ConfigTransport> {
    let mut transport = MockConfigTransport::new();
    transport.expect_discover_services().times(0);
    Arc::new(transport)
}

fn locator_without_env(
    config: &ClientConfig,
    transport: Arc<dyn ConfigTransport>,
) -> ServiceLocator {
    temp_env::with_var_unset(CONFIG_SERVICE_ENV, || ServiceLocator::new(config, &retry(), transport))
}

#[tokio::test]
#[serial]
async fn test_config_value_overrides_discovery() {
    let locator = locator_without_env(
        &client_config(Some(" http://s1:8080 , http://s2:8080,")),
        untouched_transport(),
    );

    assert!(locator.is_customized());
    let services = locator.get_services().await.unwrap();
    assert_eq!(urls(&services), vec!["http://s1:8080", "http://s2:8080"]);
}

#[tokio::test]
#[serial]
async fn test_env_overrides_when_config_is_unset() {
    let config = client_config(None);
    let locator = temp_env::with_var(CONFIG_SERVICE_ENV, Some("http://env:8080"), || {
        ServiceLocator::new(&config, &retry(), untouched_transport())
    });

    let services = locator.get_services().await.unwrap();
    assert_eq!(urls(&services), vec!["http://env:8080"]);
}

#[tokio::test]
#[serial]
async fn test_config_value_wins_over_env() {
    let config = client_config(Some("http://config:8080"));
    let locator = temp_env::with_var(CONFIG_SERVICE_ENV, Some("http://env:8080"), || {
        ServiceLocator::new(&config, &retry(), untouched_transport())
    });

    let services = locator.get_services().await.unwrap();
    assert_eq!(urls(&services), vec!["http://config:8080"]);
}

#[tokio::test]
#[serial]
async fn test_properties_file_is_last_override() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("server.properties");
    std::fs::write(&path, "env=DEV\nconfig_service=http://p1:8080,http://p2:8080\n").unwrap();
    let config = ClientConfig {
        server_properties_path: path,
        ..client_config(None)
    };

    let locator = locator_without_env(&config, untouched_transport());

    assert!(locator.is_customized());
    assert_eq!(
        urls(&locator.get_services().await.unwrap()),
        vec!["http://p1:8080", "http://p2:8080"]
    );
}

#[tokio::test]
#[serial]
async fn test_customized_list_is_never_refreshed() {
    let locator = Arc::new(locator_without_env(
        &client_config(Some("http://s1:8080")),
        untouched_transport(),
    ));
    let (_tx, rx) = tokio::sync::watch::channel(());

    assert!(locator.start_periodic_refresh(rx).is_none());
    locator.update_services().await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_empty_list_triggers_synchronous_discovery_once() {
    enable_logger();
    let mut transport = MockConfigTransport::new();
    transport
        .expect_discover_services()
        .times(1)
        .returning(|meta, app_id, _| {
            assert_eq!(meta, "http://meta:8080");
            assert_eq!(app_id, "a");
            Ok(vec![instance("http://d1:8080")])
        });
    let locator = locator_without_env(&client_config(None), Arc::new(transport));

    assert!(!locator.is_customized());
    for _ in 0..3 {
        assert_eq!(urls(&locator.get_services().await.unwrap()), vec!["http://d1:8080"]);
    }
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_empty_discovery_answer_is_retried_then_unavailable() {
    enable_logger();
    let mut transport = MockConfigTransport::new();
    transport
        .expect_discover_services()
        .times(2)
        .returning(|_, _, _| Ok(Vec::new()));
    let locator = locator_without_env(&client_config(None), Arc::new(transport));

    let err = locator.get_services().await.unwrap_err();
    assert!(matches!(err, Error::Client(ClientError::NoServiceAvailable)));
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_periodic_refresh_replaces_list_and_keeps_it_on_failure() {
    enable_logger();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut transport = MockConfigTransport::new();
    transport.expect_discover_services().returning(move |_, _, _| {
        match counter.fetch_add(1, Ordering::SeqCst) {
            0 => Ok(vec![instance("http://old:8080")]),
            1 => Ok(vec![instance("http://new:8080")]),
            _ => Err(Error::Fatal("meta service down".to_string())),
        }
    });
    let locator = Arc::new(locator_without_env(&client_config(None), Arc::new(transport)));
    let (tx, rx) = tokio::sync::watch::channel(());

    locator.update_services().await.unwrap();
    let handle = locator.start_periodic_refresh(rx).unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(urls(&locator.get_services().await.unwrap()), vec!["http://new:8080"]);

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(calls.load(Ordering::SeqCst) >= 3);
    assert_eq!(urls(&locator.get_services().await.unwrap()), vec!["http://new:8080"]);

    tx.send(()).unwrap();
    handle.await.unwrap();
}
