use std::sync::Arc;
use std::time::Duration;

use config_relay::ClientConfig;
use config_relay::ConfigClient;
use config_relay::ConfigChangeEvent;
use config_relay::ConfigChangeListener;
use config_relay::PropertyChangeType;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::timeout;

use crate::common::start_relay;
use crate::common::APP_ID;
use crate::common::NAMESPACE;

struct ChannelListener {
    tx: mpsc::UnboundedSender<ConfigChangeEvent>,
}

impl ConfigChangeListener for ChannelListener {
    fn on_change(
        &self,
        event: &ConfigChangeEvent,
    ) {
        let _ = self.tx.send(event.clone());
    }
}

fn client_config(
    config_service: String,
    cache_dir: &std::path::Path,
) -> ClientConfig {
    ClientConfig {
        app_id: APP_ID.to_string(),
        config_service: Some(config_service),
        cache_dir: cache_dir.to_path_buf(),
        long_poll_initial_delay_in_ms: 0,
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_client_receives_published_change() {
    let relay = start_relay();
    let first = relay.release("r1", &[("timeout", "100")]);
    relay.wait_scanned(first).await;

    let cache_dir = tempfile::tempdir().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let client = ConfigClient::builder(APP_ID)
        .set_config(client_config(relay.url(), cache_dir.path()))
        .build(shutdown_rx)
        .unwrap();

    let config = client.get_config(NAMESPACE).await.unwrap();
    assert_eq!(config.get("timeout").map(String::as_str), Some("100"));

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.add_change_listener(NAMESPACE, Arc::new(ChannelListener { tx })).await;

    // let the first long poll round catch up with the release already known
    tokio::time::sleep(Duration::from_millis(300)).await;
    relay.release("r2", &[("timeout", "200")]);

    let changed = timeout(Duration::from_secs(10), async {
        loop {
            let event = rx.recv().await.unwrap();
            if event.configurations.get("timeout").map(String::as_str) == Some("200") {
                return event;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(changed.configurations.len(), 1);
    let change = changed.get_change("timeout").unwrap();
    assert_eq!(change.change_type, PropertyChangeType::Modified);
    assert_eq!(change.old_value.as_deref(), Some("100"));
    assert_eq!(
        client.get_config(NAMESPACE).await.unwrap().get("timeout").map(String::as_str),
        Some("200")
    );

    shutdown_tx.send(()).unwrap();
    relay.shutdown.send(()).unwrap();
    timeout(Duration::from_secs(5), client.join()).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_client_falls_back_to_local_cache_when_relay_is_gone() {
    let relay = start_relay();
    let first = relay.release("r1", &[("timeout", "100")]);
    relay.wait_scanned(first).await;

    let cache_dir = tempfile::tempdir().unwrap();
    {
        let (_shutdown_tx, shutdown_rx) = watch::channel(());
        let client = ConfigClient::builder(APP_ID)
            .set_config(client_config(relay.url(), cache_dir.path()))
            .build(shutdown_rx)
            .unwrap();
        client.get_config(NAMESPACE).await.unwrap();
    }
    let url = relay.url();
    relay.shutdown.send(()).unwrap();
    timeout(Duration::from_secs(5), relay.server.run()).await.unwrap().unwrap();

    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    let client = ConfigClient::builder(APP_ID)
        .set_config(client_config(url, cache_dir.path()))
        .build(shutdown_rx)
        .unwrap();
    let config = client.get_config(NAMESPACE).await.unwrap();
    assert_eq!(config.get("timeout").map(String::as_str), Some("100"));
}
