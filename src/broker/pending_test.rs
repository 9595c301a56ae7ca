use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::pending::*;
use crate::ConfigNotification;

fn keys(keys: &[&str]) -> BTreeSet<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

#[test]
fn test_register_indexes_every_key_case_insensitively() {
    let registry = Arc::new(PendingRegistry::new());
    let (registration, _rx) = registry.register(&keys(&["A+default+App", "a+sha+App"]), BTreeMap::new());

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.key_count(), 2);
    assert_eq!(registry.matching("a+DEFAULT+app").len(), 1);
    assert_eq!(registry.matching("a+sha+app")[0].id, registration.poll.id);
    assert!(registry.matching("b+default+app").is_empty());
}

#[test]
fn test_drop_deregisters_from_all_keys() {
    let registry = Arc::new(PendingRegistry::new());
    let (first, _rx1) = registry.register(&keys(&["a+default+x", "a+default+y"]), BTreeMap::new());
    let (_second, _rx2) = registry.register(&keys(&["a+default+x"]), BTreeMap::new());
    assert_eq!(registry.matching("a+default+x").len(), 2);

    drop(first);

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.matching("a+default+x").len(), 1);
    assert!(registry.matching("a+default+y").is_empty());
    assert_eq!(registry.key_count(), 1);
}

#[test]
fn test_deregister_is_idempotent() {
    let registry = Arc::new(PendingRegistry::new());
    let (registration, _rx) = registry.register(&keys(&["a+default+x"]), BTreeMap::new());

    registry.deregister(&registration.poll);
    registry.deregister(&registration.poll);
    drop(registration);

    assert_eq!(registry.len(), 0);
    assert_eq!(registry.key_count(), 0);
}

#[tokio::test]
async fn test_resolve_is_take_once_and_restores_names() {
    let registry = Arc::new(PendingRegistry::new());
    let original = BTreeMap::from([("FX.relay".to_string(), "fx.relay".to_string())]);
    let (registration, rx) = registry.register(&keys(&["a+default+FX.relay"]), original);

    assert!(registration.poll.resolve(vec![ConfigNotification::new("FX.relay", 3)]));
    assert!(!registration.poll.resolve(vec![ConfigNotification::new("FX.relay", 4)]));
    assert!(!registration.poll.close());

    let received = rx.await.unwrap();
    assert_eq!(received, vec![ConfigNotification::new("fx.relay", 3)]);
}

#[test]
fn test_resolve_after_client_left_reports_false() {
    let registry = Arc::new(PendingRegistry::new());
    let (registration, rx) = registry.register(&keys(&["a+default+x"]), BTreeMap::new());
    drop(rx);

    assert!(!registration.poll.resolve(vec![ConfigNotification::new("x", 1)]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_resolve_and_close_complete_once() {
    let registry = Arc::new(PendingRegistry::new());

    for round in 0..200 {
        let (registration, rx) = registry.register(&keys(&["a+default+x"]), BTreeMap::new());
        let barrier = Arc::new(tokio::sync::Barrier::new(3));

        let racers: Vec<_> = (0..3)
            .map(|racer| {
                let poll = registration.poll.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    match racer {
                        2 => poll.close(),
                        _ => poll.resolve(vec![ConfigNotification::new("x", racer)]),
                    }
                })
            })
            .collect();

        let mut completed = 0;
        for racer in racers {
            if racer.await.unwrap() {
                completed += 1;
            }
        }
        assert_eq!(completed, 1, "round {round}");

        drop(registration);
        if let Ok(notifications) = rx.await {
            assert_eq!(notifications.len(), 1);
        }
    }

    assert_eq!(registry.len(), 0);
    assert_eq!(registry.key_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_on_one_key_balance_out() {
    let registry = Arc::new(PendingRegistry::new());

    let clients: Vec<_> = (0..32)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    let (registration, _rx) = registry.register(&keys(&["a+default+x"]), BTreeMap::new());
                    tokio::task::yield_now().await;
                    drop(registration);
                }
            })
        })
        .collect();
    let notifier = {
        let registry = registry.clone();
        tokio::spawn(async move {
            for id in 0..500 {
                for poll in registry.matching("a+default+x") {
                    poll.resolve(vec![ConfigNotification::new("x", id)]);
                }
                tokio::task::yield_now().await;
            }
        })
    };

    for client in clients {
        client.await.unwrap();
    }
    notifier.await.unwrap();

    assert_eq!(registry.len(), 0);
    assert_eq!(registry.key_count(), 0);
    assert!(registry.matching("a+default+x").is_empty());
}
