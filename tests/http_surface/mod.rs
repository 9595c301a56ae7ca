use std::time::Duration;
use std::time::Instant;

use config_relay::ConfigNotification;
use config_relay::ConfigResponse;
use config_relay::ServiceInstance;
use reqwest::StatusCode;
use reqwest::Url;

use crate::common::start_relay;
use crate::common::APP_ID;
use crate::common::CLUSTER;
use crate::common::LONG_POLL_TIMEOUT_IN_MS;
use crate::common::NAMESPACE;

fn notifications_url(
    base: &str,
    notifications: &str,
) -> Url {
    Url::parse_with_params(
        &format!("{base}/notifications/v2"),
        &[("appId", APP_ID), ("cluster", CLUSTER), ("notifications", notifications)],
    )
    .unwrap()
}

fn configs_url(base: &str) -> String {
    format!("{base}/configs/{APP_ID}/{CLUSTER}/{NAMESPACE}")
}

#[tokio::test]
async fn test_long_poll_answers_immediately_when_client_is_behind() {
    let relay = start_relay();
    let id = relay.release("r1", &[("timeout", "100")]);
    relay.wait_scanned(id).await;

    let payload = format!(r#"[{{"namespaceName":"{NAMESPACE}","notificationId":-1}}]"#);
    let response = reqwest::get(notifications_url(&relay.url(), &payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let notifications: Vec<ConfigNotification> = response.json().await.unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].namespace_name, NAMESPACE);
    assert_eq!(notifications[0].notification_id, id as i64);
}

#[tokio::test]
async fn test_long_poll_times_out_with_not_modified() {
    let relay = start_relay();
    let id = relay.release("r1", &[("timeout", "100")]);
    relay.wait_scanned(id).await;

    let payload = format!(r#"[{{"namespaceName":"{NAMESPACE}","notificationId":{id}}}]"#);
    let started = Instant::now();
    let response = reqwest::get(notifications_url(&relay.url(), &payload)).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert!(started.elapsed() >= Duration::from_millis(LONG_POLL_TIMEOUT_IN_MS - 50));
}

#[tokio::test]
async fn test_long_poll_completes_when_release_is_published() {
    let relay = start_relay();
    let first = relay.release("r1", &[("timeout", "100")]);
    relay.wait_scanned(first).await;

    let payload = format!(r#"[{{"namespaceName":"{NAMESPACE}","notificationId":{first}}}]"#);
    let url = notifications_url(&relay.url(), &payload);
    let poll = tokio::spawn(async move { reqwest::get(url).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    let second = relay.release("r2", &[("timeout", "200")]);

    let response = poll.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let notifications: Vec<ConfigNotification> = response.json().await.unwrap();
    assert_eq!(notifications[0].notification_id, second as i64);
}

#[tokio::test]
async fn test_long_poll_rejects_malformed_notifications() {
    let relay = start_relay();
    let response = reqwest::get(notifications_url(&relay.url(), "not-json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_configs_found_not_modified_and_not_found() {
    let relay = start_relay();
    let id = relay.release("r1", &[("timeout", "100")]);
    relay.wait_scanned(id).await;

    let response = reqwest::get(configs_url(&relay.url())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let config: ConfigResponse = response.json().await.unwrap();
    assert_eq!(config.release_key, "r1");
    assert_eq!(config.configurations.get("timeout").map(String::as_str), Some("100"));

    let response = reqwest::get(format!("{}?releaseKey=r1", configs_url(&relay.url())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);

    let response = reqwest::get(format!("{}/configs/{APP_ID}/{CLUSTER}/missing", relay.url()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_services_lists_the_relay_itself() {
    let relay = start_relay();
    let response = reqwest::get(format!("{}/services/config?appId={APP_ID}", relay.url()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let instances: Vec<ServiceInstance> = response.json().await.unwrap();
    assert!(!instances.is_empty());
}
