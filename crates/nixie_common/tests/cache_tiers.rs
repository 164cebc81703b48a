//! Cache behaviour across both tiers and across reopen.

use nixie_common::config::CacheSettings;
use nixie_common::Cache;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn test_ttl_round_trip() {
    let cache = Cache::in_memory(16, Duration::from_secs(60));
    cache.set("k", &"v".to_string(), Some(Duration::from_secs(1)));
    assert_eq!(cache.get::<String>("k"), Some("v".to_string()));

    thread::sleep(Duration::from_millis(1100));
    assert_eq!(cache.get::<String>("k"), None);
}

#[test]
fn test_ttl_round_trip_on_disk() {
    let dir = tempdir().unwrap();
    let cache = Cache::with_disk(&dir.path().join("cache.db"), 16, Duration::from_secs(60)).unwrap();
    cache.set("k", &vec![1u32, 2, 3], Some(Duration::from_secs(1)));
    assert_eq!(cache.get::<Vec<u32>>("k"), Some(vec![1, 2, 3]));

    thread::sleep(Duration::from_millis(1100));
    assert_eq!(cache.get::<Vec<u32>>("k"), None);
    assert_eq!(cache.sweep().unwrap(), 0);
}

#[test]
fn test_disk_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.db");
    {
        let cache = Cache::with_disk(&path, 16, Duration::from_secs(60)).unwrap();
        cache.set("search:python", &"python3".to_string(), None);
    }

    let reopened = Cache::with_disk(&path, 16, Duration::from_secs(60)).unwrap();
    assert_eq!(reopened.get::<String>("search:python"), Some("python3".to_string()));
    let stats = reopened.stats();
    assert_eq!(stats.hits, 1);
    // promoted into memory on the disk hit
    assert_eq!(stats.memory_entries, 1);
    assert_eq!(stats.disk_entries, Some(1));
}

#[test]
fn test_unwritable_dir_degrades_to_memory() {
    let dir = tempdir().unwrap();
    // a file where the cache directory should be
    let blocker = dir.path().join("blocked");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let settings = CacheSettings {
        dir: Some(blocker.join("nested")),
        ..CacheSettings::default()
    };
    let cache = Cache::from_settings(&settings);
    assert!(!cache.is_persistent());
    cache.set("k", &1u8, None);
    assert_eq!(cache.get::<u8>("k"), Some(1));
}

#[test]
fn test_concurrent_access() {
    let dir = tempdir().unwrap();
    let cache = Arc::new(Cache::with_disk(&dir.path().join("cache.db"), 256, Duration::from_secs(60)).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let cache = cache.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    let key = format!("t{}-{}", t, i);
                    cache.set(&key, &i, None);
                    assert_eq!(cache.get::<i32>(&key), Some(i));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(cache.stats().disk_entries, Some(100));
}
