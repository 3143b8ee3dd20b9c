// Cache store and eviction tests - public APIs only
// Author: kelexine (https://github.com/kelexine)

use async_trait::async_trait;
use bytes::Bytes;
use repo_gallery::cache::{
    CacheStorage, CacheStore, EvictionPolicy, ManualClock, QuotaEstimator, StorageEstimate,
};
use repo_gallery::error::Result;
use std::sync::Arc;
use std::time::Duration;

/// Usage is the payload size of one store against a fixed quota.
struct StoreQuota {
    store: CacheStore,
    quota: u64,
}

#[async_trait]
impl QuotaEstimator for StoreQuota {
    async fn estimate(&self) -> Result<StorageEstimate> {
        Ok(StorageEstimate {
            usage: self.store.size_bytes().await?,
            quota: Some(self.quota),
        })
    }
}

async fn storage() -> (tempfile::TempDir, Arc<ManualClock>, CacheStorage) {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::default());
    let storage = CacheStorage::with_clock(dir.path(), clock.clone());
    (dir, clock, storage)
}

#[tokio::test]
async fn test_put_get_roundtrip_keeps_content_type() {
    let (_dir, _clock, storage) = storage().await;
    let images = storage.open("img-cache-v1").await.unwrap();

    images
        .put("https://raw.example.com/a.png", Bytes::from_static(b"PNGDATA"), "image/png", None)
        .await
        .unwrap();

    let hit = images.get("https://raw.example.com/a.png").await.unwrap().unwrap();
    assert_eq!(&hit.data[..], b"PNGDATA");
    assert_eq!(hit.entry.content_type, "image/png");
    assert_eq!(hit.entry.size, 7);
    assert!(images.get("https://raw.example.com/b.png").await.unwrap().is_none());
}

#[tokio::test]
async fn test_expired_entry_is_a_miss_and_removed() {
    let (_dir, clock, storage) = storage().await;
    let images = storage.open("img").await.unwrap();

    images
        .put("old", Bytes::from_static(b"x"), "image/jpeg", Some(Duration::from_secs(60)))
        .await
        .unwrap();
    clock.advance(chrono::Duration::seconds(61));

    assert!(images.get("old").await.unwrap().is_none());
    assert!(images.keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_zero_ttl_never_expires() {
    let (_dir, clock, storage) = storage().await;
    let images = storage.open("img").await.unwrap();

    images
        .put("forever", Bytes::from_static(b"x"), "image/jpeg", Some(Duration::ZERO))
        .await
        .unwrap();
    clock.advance(chrono::Duration::days(1000));

    let hit = images.get("forever").await.unwrap().unwrap();
    assert!(hit.entry.expires_at.is_none());
}

#[tokio::test]
async fn test_overwrite_is_last_write_wins() {
    let (_dir, _clock, storage) = storage().await;
    let images = storage.open("img").await.unwrap();

    images.put("k", Bytes::from_static(b"first"), "image/png", None).await.unwrap();
    images.put("k", Bytes::from_static(b"second!"), "image/webp", None).await.unwrap();

    let hit = images.get("k").await.unwrap().unwrap();
    assert_eq!(&hit.data[..], b"second!");
    assert_eq!(hit.entry.content_type, "image/webp");
    assert_eq!(images.size().await.unwrap().entries, 1);
}

#[tokio::test]
async fn test_lru_eviction_stops_at_low_water() {
    let (_dir, clock, storage) = storage().await;
    let images = storage.open("img").await.unwrap();

    // 17 x 50 bytes against a 1000 byte quota: ratio 0.85
    for i in 0..17 {
        images
            .put(&format!("k{:02}", i), Bytes::from(vec![0u8; 50]), "image/jpeg", None)
            .await
            .unwrap();
        clock.advance(chrono::Duration::seconds(1));
    }
    // Reading k00 makes it the most recently used entry
    assert!(images.get("k00").await.unwrap().is_some());

    let estimator = StoreQuota {
        store: images.clone(),
        quota: 1000,
    };
    let evicted = EvictionPolicy::default().evict_lru(&images, &estimator).await.unwrap();

    // 850 -> 800 -> 750 -> 700
    assert_eq!(evicted, 3);
    let keys = images.keys().await.unwrap();
    assert_eq!(keys.len(), 14);
    assert!(keys.contains(&"k00".to_string()));
    for gone in ["k01", "k02", "k03"] {
        assert!(!keys.contains(&gone.to_string()), "{} should be evicted", gone);
    }
    assert!(estimator.estimate().await.unwrap().ratio() <= 0.7);
}

#[tokio::test]
async fn test_lru_eviction_idle_below_high_water() {
    let (_dir, _clock, storage) = storage().await;
    let images = storage.open("img").await.unwrap();
    for i in 0..7 {
        images
            .put(&format!("k{}", i), Bytes::from(vec![0u8; 100]), "image/jpeg", None)
            .await
            .unwrap();
    }

    let estimator = StoreQuota {
        store: images.clone(),
        quota: 1000,
    };
    assert_eq!(EvictionPolicy::default().evict_lru(&images, &estimator).await.unwrap(), 0);
    assert_eq!(images.size().await.unwrap().entries, 7);
}

#[tokio::test]
async fn test_lru_eviction_bounded_by_batch() {
    let (_dir, clock, storage) = storage().await;
    let images = storage.open("img").await.unwrap();
    for i in 0..10 {
        images
            .put(&format!("k{}", i), Bytes::from(vec![0u8; 100]), "image/jpeg", None)
            .await
            .unwrap();
        clock.advance(chrono::Duration::seconds(1));
    }

    let estimator = StoreQuota {
        store: images.clone(),
        quota: 1000,
    };
    let policy = EvictionPolicy {
        batch_size: 2,
        ..EvictionPolicy::default()
    };
    assert_eq!(policy.evict_lru(&images, &estimator).await.unwrap(), 2);
    assert_eq!(images.keys().await.unwrap().first().map(String::as_str), Some("k2"));
}

#[tokio::test]
async fn test_eviction_never_touches_core_namespace() {
    let (_dir, clock, storage) = storage().await;
    let core = storage.open("core-cache-v1").await.unwrap();
    let images = storage.open("img-cache-v1").await.unwrap();

    core.put("/index.html", Bytes::from(vec![1u8; 400]), "text/html", None).await.unwrap();
    for i in 0..5 {
        images
            .put(
                &format!("img{}", i),
                Bytes::from(vec![0u8; 100]),
                "image/jpeg",
                Some(Duration::from_secs(10)),
            )
            .await
            .unwrap();
    }
    clock.advance(chrono::Duration::seconds(11));

    let estimator = StoreQuota {
        store: images.clone(),
        quota: 100,
    };
    let report = EvictionPolicy::default().run(&images, &estimator).await.unwrap();
    assert_eq!(report.expired, 5);
    assert_eq!(report.lru, 0);
    assert!(core.get("/index.html").await.unwrap().is_some());
}

#[tokio::test]
async fn test_clear_only_affects_one_namespace() {
    let (_dir, _clock, storage) = storage().await;
    let core = storage.open("core").await.unwrap();
    let images = storage.open("img").await.unwrap();
    core.put("/", Bytes::from_static(b"<html>"), "text/html", None).await.unwrap();
    images.put("a", Bytes::from_static(b"a"), "image/png", None).await.unwrap();
    images.put("b", Bytes::from_static(b"b"), "image/png", None).await.unwrap();

    assert_eq!(images.clear().await.unwrap(), 2);
    assert_eq!(images.size().await.unwrap().entries, 0);
    assert_eq!(core.keys().await.unwrap(), vec!["/"]);
}

#[tokio::test]
async fn test_namespaces_listed_and_deleted() {
    let (_dir, _clock, storage) = storage().await;
    storage.open("core-cache-v0").await.unwrap();
    storage.open("img-cache-v1").await.unwrap();

    let mut names = storage.names().await.unwrap();
    names.sort();
    assert_eq!(names, vec!["core-cache-v0", "img-cache-v1"]);

    assert!(storage.delete("core-cache-v0").await.unwrap());
    assert_eq!(storage.names().await.unwrap(), vec!["img-cache-v1"]);
}
