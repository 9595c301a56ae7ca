use std::sync::Arc;

use super::*;
use crate::test_utils::enable_logger;
use crate::ServerConfig;

fn sled_log() -> SledReleaseLog {
    let db = sled::Config::new().temporary(true).open().unwrap();
    SledReleaseLog::new(db).unwrap()
}

fn check_append_assigns_increasing_ids(log: &dyn ReleaseLog) {
    assert!(log.is_empty());
    assert_eq!(log.latest_id().unwrap(), 0);

    let a = log.append("app+default+a").unwrap();
    let b = log.append("app+default+b").unwrap();
    let c = log.append("app+default+a").unwrap();

    assert_eq!((a.id, b.id, c.id), (1, 2, 3));
    assert_eq!(c.watch_key, "app+default+a");
    assert!(c.timestamp_ms >= a.timestamp_ms);
    assert_eq!(log.latest_id().unwrap(), 3);
    assert_eq!(log.len(), 3);
    assert_eq!(log.find(2).unwrap(), Some(b));
    assert_eq!(log.find(42).unwrap(), None);
}

fn check_find_after_pages_ascending(log: &dyn ReleaseLog) {
    for i in 0..10 {
        log.append(&format!("app+default+ns{i}")).unwrap();
    }

    let page = log.find_after(0, 4).unwrap();
    assert_eq!(page.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2, 3, 4]);

    let page = log.find_after(4, 4).unwrap();
    assert_eq!(page.iter().map(|e| e.id).collect::<Vec<_>>(), vec![5, 6, 7, 8]);

    let page = log.find_after(8, 4).unwrap();
    assert_eq!(page.iter().map(|e| e.id).collect::<Vec<_>>(), vec![9, 10]);

    assert!(log.find_after(10, 4).unwrap().is_empty());
    assert!(log.find_after(u64::MAX, 4).unwrap().is_empty());
}

fn check_delete_superseded(log: &dyn ReleaseLog) {
    // ids 1..=5 for key a, 6 for key b, 7 for key a
    for _ in 0..5 {
        log.append("app+default+a").unwrap();
    }
    log.append("app+default+b").unwrap();
    let latest = log.append("app+default+a").unwrap();

    // page size 2: oldest first
    assert_eq!(log.delete_superseded("app+default+a", latest.id, 2).unwrap(), 2);
    assert!(log.find(1).unwrap().is_none());
    assert!(log.find(2).unwrap().is_none());
    assert!(log.find(3).unwrap().is_some());

    assert_eq!(log.delete_superseded("app+default+a", latest.id, 100).unwrap(), 3);
    assert_eq!(log.delete_superseded("app+default+a", latest.id, 100).unwrap(), 0);

    // other keys and the latest event survive
    let remaining: Vec<u64> = log.find_after(0, 100).unwrap().iter().map(|e| e.id).collect();
    assert_eq!(remaining, vec![6, 7]);
    assert_eq!(log.latest_id().unwrap(), 7);
}

#[test]
fn test_mem_append_assigns_increasing_ids() {
    check_append_assigns_increasing_ids(&MemReleaseLog::new());
}

#[test]
fn test_sled_append_assigns_increasing_ids() {
    enable_logger();
    check_append_assigns_increasing_ids(&sled_log());
}

#[test]
fn test_mem_find_after_pages_ascending() {
    check_find_after_pages_ascending(&MemReleaseLog::new());
}

#[test]
fn test_sled_find_after_pages_ascending() {
    enable_logger();
    check_find_after_pages_ascending(&sled_log());
}

#[test]
fn test_mem_delete_superseded() {
    check_delete_superseded(&MemReleaseLog::new());
}

#[test]
fn test_sled_delete_superseded() {
    enable_logger();
    check_delete_superseded(&sled_log());
}

#[test]
fn test_sled_ids_survive_restart_after_compaction() {
    enable_logger();
    let temp_dir = tempfile::tempdir().unwrap();
    let config = ServerConfig::default();

    {
        let db = init_sled_release_log_db(temp_dir.path(), &config).unwrap();
        let log = SledReleaseLog::new(db).unwrap();
        log.append("app+default+a").unwrap();
        log.append("app+default+a").unwrap();
        log.append("app+default+a").unwrap();
        log.delete_superseded("app+default+a", 3, 100).unwrap();
        log.flush().unwrap();
    }

    let db = init_sled_release_log_db(temp_dir.path(), &config).unwrap();
    let log = SledReleaseLog::new(db).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log.latest_id().unwrap(), 3);
    assert_eq!(log.append("app+default+b").unwrap().id, 4);
}

#[test]
fn test_sled_concurrent_appends_are_gapless() {
    enable_logger();
    let log = Arc::new(sled_log());

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let log = log.clone();
            std::thread::spawn(move || {
                for i in 0..25 {
                    log.append(&format!("app+default+t{t}-{i}")).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let ids: Vec<u64> = log.find_after(0, 1000).unwrap().iter().map(|e| e.id).collect();
    assert_eq!(ids, (1..=100).collect::<Vec<u64>>());
}

#[test]
fn test_mem_log_offline() {
    let log = MemReleaseLog::new();
    log.append("app+default+a").unwrap();

    log.set_available(false);
    assert!(log.append("app+default+a").is_err());
    assert!(log.find_after(0, 10).is_err());
    assert!(log.latest_id().is_err());

    log.set_available(true);
    assert_eq!(log.latest_id().unwrap(), 1);
}
