use serial_test::serial;
use temp_env::with_vars;

use super::*;

fn cleanup_all_relay_env_vars() {
    for (key, _) in std::env::vars() {
        if key.starts_with("RELAY__") || key == "CONFIG_PATH" {
            std::env::remove_var(&key);
        }
    }
}

#[test]
#[serial]
fn default_config_should_initialize_with_hardcoded_values() {
    let config = RelayConfig::default();

    assert_eq!(config.server.listen_address.port(), 8080);
    assert_eq!(config.server.storage, StorageKind::Sled);
    assert_eq!(config.release_log.scan_batch_size, 500);
    assert_eq!(config.release_log.compaction_queue_size, 100);
    assert_eq!(config.broker.long_poll_timeout_in_ms, 60_000);
    assert_eq!(config.broker.notification_batch, 100);
    assert_eq!(config.retry.long_poll.max_delay_ms, 120_000);
    assert!(!config.monitoring.metrics_enabled);
    assert_eq!(config.monitoring.metrics_path, "metrics");
}

#[test]
#[serial]
fn new_should_merge_environment_overrides() {
    cleanup_all_relay_env_vars();
    with_vars(
        vec![
            ("RELAY__BROKER__LONG_POLL_TIMEOUT_IN_MS", Some("1500")),
            ("RELAY__CLIENT__APP_ID", Some("SampleApp")),
        ],
        || {
            let config = RelayConfig::new().unwrap();

            assert_eq!(config.broker.long_poll_timeout_in_ms, 1500);
            assert_eq!(config.client.app_id, "SampleApp");
        },
    );
}

#[test]
#[serial]
fn with_override_config_should_merge_file_settings() {
    cleanup_all_relay_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("dynamic_config.toml");

    std::fs::write(
        &config_path,
        r#"
        [server]
        db_root_dir = "/tmp/xx/db"
        storage = "memory"

        [release_log]
        scan_interval_in_ms = 250

        [retry.config_load]
        base_delay_ms = 10
        max_delay_ms = 80
        "#,
    )
    .unwrap();

    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let base_config = RelayConfig::new().expect("success");
        let config = base_config.with_override_config(config_path.to_str().unwrap()).unwrap();

        assert_eq!(config.server.db_root_dir.as_os_str().to_str(), Some("/tmp/xx/db"));
        assert_eq!(config.server.storage, StorageKind::Memory);
        assert_eq!(config.release_log.scan_interval_in_ms, 250);
        assert_eq!(config.retry.config_load.base_delay_ms, 10);
        assert_eq!(config.retry.config_load.max_delay_ms, 80);
        // untouched sections keep their defaults
        assert_eq!(config.broker.notification_batch, 100);
    });
}

#[test]
#[serial]
fn environment_variables_should_have_highest_priority() {
    cleanup_all_relay_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("test_config.toml");
    std::fs::write(
        &config_path,
        r#"
        [broker]
        notification_batch = 10
        notification_batch_interval_in_ms = 5
        "#,
    )
    .unwrap();

    with_vars(
        vec![
            ("CONFIG_PATH", Some(config_path.to_str().unwrap())),
            ("RELAY__BROKER__NOTIFICATION_BATCH", Some("20")),
        ],
        || {
            let config = RelayConfig::new().unwrap();
            assert_eq!(config.broker.notification_batch, 20);
            assert_eq!(config.broker.notification_batch_interval_in_ms, 5);
        },
    );
}

#[test]
#[serial]
fn missing_config_path_file_should_fail() {
    cleanup_all_relay_env_vars();
    with_vars(vec![("CONFIG_PATH", Some("/nonexistent/relay.toml"))], || {
        assert!(RelayConfig::new().is_err());
    });
}

#[test]
fn validation_should_accept_defaults() {
    assert!(RelayConfig::default().validate().is_ok());
}

#[test]
fn validation_should_fail_with_zero_batch() {
    let mut config = RelayConfig::default();
    config.broker.notification_batch = 0;

    assert!(config.validate().is_err());
}

#[test]
fn validation_should_detect_inverted_backoff() {
    let mut config = RelayConfig::default();
    config.retry.long_poll.base_delay_ms = 10_000;
    config.retry.long_poll.max_delay_ms = 1_000;

    assert!(config.validate().is_err());
}

#[test]
fn validation_should_reject_privileged_metrics_port() {
    let mut config = RelayConfig::default();
    config.monitoring.metrics_enabled = true;
    config.monitoring.metrics_address = "0.0.0.0:80".parse().unwrap();

    assert!(config.validate().is_err());
}

#[test]
fn validation_should_reject_metrics_port_shared_with_relay_listener() {
    let mut config = RelayConfig::default();
    config.server.listen_address = "0.0.0.0:9300".parse().unwrap();
    config.monitoring.metrics_enabled = true;
    config.monitoring.metrics_address = "127.0.0.1:9300".parse().unwrap();
    assert!(config.clone().validate().is_err());

    config.monitoring.metrics_enabled = false;
    assert!(config.validate().is_ok());
}

#[test]
fn validation_should_reject_nested_metrics_path() {
    let mut config = RelayConfig::default();
    config.monitoring.metrics_enabled = true;
    config.monitoring.metrics_path = "internal/metrics".to_string();
    assert!(config.clone().validate().is_err());

    config.monitoring.metrics_path = String::new();
    assert!(config.validate().is_err());
}

#[test]
fn validation_should_reject_bad_advertised_url() {
    let mut config = RelayConfig::default();
    config.server.advertised_urls = vec!["10.0.0.1:8080".into()];

    assert!(config.validate().is_err());
}

#[test]
fn homepage_urls_should_fall_back_to_listen_address() {
    let config = ServerConfig::default();
    assert_eq!(config.homepage_urls(), vec!["http://127.0.0.1:8080/".to_string()]);

    let config = ServerConfig {
        advertised_urls: vec!["http://relay-1:8080/".into()],
        ..Default::default()
    };
    assert_eq!(config.homepage_urls(), vec!["http://relay-1:8080/".to_string()]);
}
