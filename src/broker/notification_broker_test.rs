use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::test_utils::enable_logger;
use crate::test_utils::seed_log;
use crate::AppNamespace;
use crate::BrokerConfig;
use crate::ConfigNotification;
use crate::Error;
use crate::InMemoryNamespaceCatalog;
use crate::InvalidInputError;
use crate::MemReleaseLog;
use crate::ReleaseListener;
use crate::ReleaseLog;
use crate::ReleaseMessageCache;

struct Fixture {
    log: Arc<MemReleaseLog>,
    catalog: Arc<InMemoryNamespaceCatalog>,
    messages: Arc<ReleaseMessageCache>,
    broker: Arc<NotificationBroker>,
}

fn fixture(config: BrokerConfig) -> Fixture {
    enable_logger();
    let log = Arc::new(MemReleaseLog::new());
    let catalog = Arc::new(InMemoryNamespaceCatalog::new());
    let messages = Arc::new(ReleaseMessageCache::new(log.clone(), 10, Duration::from_millis(10)));
    messages.warm_up().unwrap();
    let broker = Arc::new(NotificationBroker::new(catalog.clone(), messages.clone(), &config));
    Fixture {
        log,
        catalog,
        messages,
        broker,
    }
}

fn short_timeout() -> BrokerConfig {
    BrokerConfig {
        long_poll_timeout_in_ms: 5_000,
        notification_batch_interval_in_ms: 5,
        ..Default::default()
    }
}

fn request(
    app_id: &str,
    notifications: Vec<ConfigNotification>,
) -> PollRequest {
    PollRequest {
        app_id: app_id.to_string(),
        cluster: "default".to_string(),
        notifications,
        ..Default::default()
    }
}

/// Publishes `key` and pushes the event through the cache and the broker
/// as the log scanner would.
fn publish(
    f: &Fixture,
    key: &str,
) -> crate::ReleaseEvent {
    let event = f.log.append(key).unwrap();
    f.messages.handle_event(&event).unwrap();
    f.broker.handle_event(&event).unwrap();
    event
}

async fn wait_for_pending(
    broker: &NotificationBroker,
    expected: usize,
) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while broker.pending_count() != expected && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(broker.pending_count(), expected);
}

#[test]
fn test_parse_notifications_rejects_bad_payloads() {
    for raw in ["", "not json", "[]", "{\"namespaceName\":\"application\"}"] {
        let result = NotificationBroker::parse_notifications(raw);
        assert!(
            matches!(result, Err(Error::InvalidInput(InvalidInputError::Notifications(_)))),
            "{raw} should be rejected"
        );
    }
}

#[test]
fn test_parse_notifications_defaults_missing_id() {
    let parsed =
        NotificationBroker::parse_notifications(r#"[{"namespaceName":"application"},{"namespaceName":"db","notificationId":9}]"#)
            .unwrap();
    assert_eq!(
        parsed,
        vec![ConfigNotification::new("application", -1), ConfigNotification::new("db", 9)]
    );
}

#[test]
fn test_filter_strips_suffix_and_keeps_lower_id_on_collision() {
    let f = fixture(short_timeout());
    f.catalog.register(AppNamespace::private("a", "FX.relay"));

    let filtered = f.broker.filter_notifications(
        "a",
        vec![
            ConfigNotification::new("fx.relay.properties", 10),
            ConfigNotification::new("FX.relay", 3),
            ConfigNotification::new("", 1),
            ConfigNotification::new("application", 5),
        ],
    );

    assert_eq!(filtered.len(), 2);
    let relay = &filtered["FX.relay"];
    assert_eq!(relay.notification_id, 3);
    assert_eq!(relay.namespace_name, "FX.relay");
    assert_eq!(filtered["application"].notification_id, 5);
}

#[tokio::test]
async fn test_poll_with_only_blank_namespaces_is_rejected() {
    let f = fixture(short_timeout());
    let result = f
        .broker
        .poll(request("a", vec![ConfigNotification::new("", 1)]))
        .await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));
    assert_eq!(f.broker.pending_count(), 0);
}

#[tokio::test]
async fn test_poll_resolves_immediately_when_client_is_behind() {
    let f = fixture(short_timeout());
    seed_log(f.log.as_ref(), &["a+default+application", "a+default+db"]);
    f.messages.load_from(0).unwrap();

    let outcome = f
        .broker
        .poll(request(
            "a",
            vec![ConfigNotification::new("application", -1), ConfigNotification::new("db", 2)],
        ))
        .await
        .unwrap();

    let mut expected = ConfigNotification::new("application", 1);
    expected.add_message("a+default+application", 1);
    assert_eq!(outcome, PollOutcome::Changed(vec![expected]));
    assert_eq!(f.broker.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_poll_times_out_with_not_modified() {
    let f = fixture(BrokerConfig {
        long_poll_timeout_in_ms: 1_000,
        ..Default::default()
    });

    let outcome = f
        .broker
        .poll(request("a", vec![ConfigNotification::new("application", -1)]))
        .await
        .unwrap();

    assert_eq!(outcome, PollOutcome::NotModified);
    assert_eq!(f.broker.pending_count(), 0);
}

#[tokio::test]
async fn test_parked_poll_is_resolved_by_event() {
    let f = fixture(short_timeout());
    f.catalog.register(AppNamespace::private("a", "FX.relay"));

    let broker = f.broker.clone();
    let parked = tokio::spawn(async move {
        broker
            .poll(request("a", vec![ConfigNotification::new("fx.relay.properties", -1)]))
            .await
    });
    wait_for_pending(&f.broker, 1).await;

    let event = publish(&f, "a+default+FX.relay");

    let outcome = parked.await.unwrap().unwrap();
    let mut expected = ConfigNotification::new("fx.relay", event.notification_id());
    expected.add_message("a+default+FX.relay", event.notification_id());
    assert_eq!(outcome, PollOutcome::Changed(vec![expected]));
    wait_for_pending(&f.broker, 0).await;
}

#[tokio::test]
async fn test_public_namespace_event_reaches_other_apps() {
    let f = fixture(short_timeout());
    f.catalog.register(AppNamespace::public("owner", "FX.common"));

    let broker = f.broker.clone();
    let parked = tokio::spawn(async move {
        broker
            .poll(request("consumer", vec![ConfigNotification::new("FX.common", -1)]))
            .await
    });
    wait_for_pending(&f.broker, 1).await;

    publish(&f, "owner+default+FX.common");

    match parked.await.unwrap().unwrap() {
        PollOutcome::Changed(notifications) => {
            assert_eq!(notifications.len(), 1);
            assert_eq!(notifications[0].namespace_name, "FX.common");
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn test_event_for_other_key_leaves_poll_parked() {
    let f = fixture(short_timeout());

    let broker = f.broker.clone();
    let parked = tokio::spawn(async move {
        broker
            .poll(request("a", vec![ConfigNotification::new("application", -1)]))
            .await
    });
    wait_for_pending(&f.broker, 1).await;

    publish(&f, "b+default+application");
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(f.broker.pending_count(), 1);

    parked.abort();
    let _ = parked.await;
    wait_for_pending(&f.broker, 0).await;
}

#[tokio::test]
async fn test_large_fan_out_is_resolved_in_batches() {
    let f = fixture(BrokerConfig {
        long_poll_timeout_in_ms: 5_000,
        notification_batch: 2,
        notification_batch_interval_in_ms: 5,
        ..Default::default()
    });

    let mut parked = Vec::new();
    for _ in 0..5 {
        let broker = f.broker.clone();
        parked.push(tokio::spawn(async move {
            broker
                .poll(request("a", vec![ConfigNotification::new("application", -1)]))
                .await
        }));
    }
    wait_for_pending(&f.broker, 5).await;

    let event = publish(&f, "a+default+application");

    for handle in parked {
        match handle.await.unwrap().unwrap() {
            PollOutcome::Changed(notifications) => {
                assert_eq!(notifications[0].notification_id, event.notification_id());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    wait_for_pending(&f.broker, 0).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_events_racing_timeouts_complete_each_poll_once() {
    let f = fixture(BrokerConfig {
        long_poll_timeout_in_ms: 20,
        notification_batch_interval_in_ms: 1,
        ..Default::default()
    });
    let mut last_seen = publish(&f, "a+default+application").notification_id();

    for round in 0..40u64 {
        let parked: Vec<_> = (0..8)
            .map(|_| {
                let broker = f.broker.clone();
                tokio::spawn(async move {
                    broker
                        .poll(request("a", vec![ConfigNotification::new("application", last_seen)]))
                        .await
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(17 + round % 6)).await;
        let event = publish(&f, "a+default+application");

        for handle in parked {
            match handle.await.unwrap().unwrap() {
                PollOutcome::Changed(notifications) => {
                    assert_eq!(notifications.len(), 1);
                    assert_eq!(notifications[0].notification_id, event.notification_id());
                }
                PollOutcome::NotModified => {}
            }
        }
        wait_for_pending(&f.broker, 0).await;
        last_seen = event.notification_id();
    }
}

#[test]
fn test_malformed_event_is_ignored() {
    let f = fixture(short_timeout());
    let event = crate::ReleaseEvent::new(1, "not-a-key", 0);
    assert!(f.broker.handle_event(&event).is_ok());
}
