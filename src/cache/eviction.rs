//! Expiry and quota-driven eviction for the image namespace.
//!
//! Two sweeps share one batch bound:
//!
//! - `sweep_expired` removes entries whose TTL has passed.
//! - `evict_lru` runs only while storage usage is at or above the high-water
//!   ratio and removes least-recently-read entries until usage falls to the
//!   low-water ratio.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use super::models::EvictionReport;
use super::store::CacheStore;
use crate::config::CacheConfig;
use crate::error::{GalleryError, Result};
use crate::metrics;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sysinfo::Disks;
use tokio::fs;
use tracing::{debug, info, warn};

/// Usage and budget of the origin's storage, as `navigator.storage.estimate()`
/// would report them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageEstimate {
    pub usage: u64,
    /// `None` means unlimited.
    pub quota: Option<u64>,
}

impl StorageEstimate {
    pub fn ratio(&self) -> f64 {
        match self.quota {
            Some(0) => 1.0,
            Some(quota) => self.usage as f64 / quota as f64,
            None => 0.0,
        }
    }
}

#[async_trait]
pub trait QuotaEstimator: Send + Sync {
    async fn estimate(&self) -> Result<StorageEstimate>;
}

/// Free space on the filesystem that holds a path.
pub trait DiskSpace: Send + Sync {
    fn available(&self, path: &Path) -> Option<u64>;
}

/// Reads free space from the mounted disks, picking the mount point that is
/// the longest prefix of the path.
pub struct SystemDisks;

impl DiskSpace for SystemDisks {
    fn available(&self, path: &Path) -> Option<u64> {
        let path = std::fs::canonicalize(path).ok()?;
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|disk| path.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
    }
}

enum Budget {
    Fixed(Option<u64>),
    Disk { fraction: f64, disk: Arc<dyn DiskSpace> },
}

/// Measures usage as the bytes on disk under the cache root. The budget is
/// either fixed or a share of what the cache could occupy on its disk.
pub struct DirectoryQuota {
    root: PathBuf,
    budget: Budget,
}

impl DirectoryQuota {
    pub fn new(root: impl Into<PathBuf>, quota: Option<u64>) -> Self {
        Self {
            root: root.into(),
            budget: Budget::Fixed(quota),
        }
    }

    /// Budget of `fraction * (usage + free space)` on the disk reported by `disk`.
    pub fn with_disk(root: impl Into<PathBuf>, fraction: f64, disk: Arc<dyn DiskSpace>) -> Self {
        Self {
            root: root.into(),
            budget: Budget::Disk { fraction, disk },
        }
    }

    /// `quota_bytes` when set, otherwise a `quota_fraction` share of the cache disk.
    pub fn from_config(config: &CacheConfig) -> Self {
        match config.quota() {
            Some(bytes) => Self::new(&config.dir, Some(bytes)),
            None => Self::with_disk(&config.dir, config.quota_fraction, Arc::new(SystemDisks)),
        }
    }

    async fn quota(&self, usage: u64) -> Result<Option<u64>> {
        match &self.budget {
            Budget::Fixed(quota) => Ok(*quota),
            Budget::Disk { fraction, disk } => {
                let disk = Arc::clone(disk);
                let root = self.root.clone();
                let available = tokio::task::spawn_blocking(move || disk.available(&root))
                    .await
                    .map_err(|e| GalleryError::Storage(format!("disk space probe failed: {}", e)))?;
                match available {
                    Some(available) => Ok(Some(((usage + available) as f64 * fraction) as u64)),
                    None => {
                        warn!("No disk found for {}, cache quota is unlimited", self.root.display());
                        Ok(None)
                    }
                }
            }
        }
    }
}

#[async_trait]
impl QuotaEstimator for DirectoryQuota {
    async fn estimate(&self) -> Result<StorageEstimate> {
        let mut usage = 0u64;
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut items = match fs::read_dir(&dir).await {
                Ok(items) => items,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(GalleryError::Storage(format!("failed to estimate usage: {}", e))),
            };
            while let Some(item) = items
                .next_entry()
                .await
                .map_err(|e| GalleryError::Storage(format!("failed to estimate usage: {}", e)))?
            {
                let Ok(meta) = item.metadata().await else {
                    continue;
                };
                if meta.is_dir() {
                    pending.push(item.path());
                } else {
                    usage += meta.len();
                }
            }
        }

        let quota = self.quota(usage).await?;
        let estimate = StorageEstimate { usage, quota };
        debug!(
            usage_mb = %format!("{:.2}", usage as f64 / (1024.0 * 1024.0)),
            quota = ?quota,
            "Cache storage estimate"
        );
        Ok(estimate)
    }
}

/// Thresholds shared by both sweeps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvictionPolicy {
    pub batch_size: usize,
    pub high_water: f64,
    pub low_water: f64,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self {
            batch_size: 50,
            high_water: 0.8,
            low_water: 0.7,
        }
    }
}

impl From<&CacheConfig> for EvictionPolicy {
    fn from(config: &CacheConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            high_water: config.high_water,
            low_water: config.low_water,
        }
    }
}

impl EvictionPolicy {
    /// Delete up to `batch_size` expired entries, earliest expiry first.
    pub async fn sweep_expired(&self, store: &CacheStore) -> Result<usize> {
        let now = store.now();
        let mut expired: Vec<_> = store
            .entries()
            .await?
            .into_iter()
            .filter(|entry| entry.is_expired(now))
            .collect();
        expired.sort_by(|a, b| a.expires_at.cmp(&b.expires_at).then_with(|| a.key.cmp(&b.key)));

        let mut removed = 0;
        for entry in expired.into_iter().take(self.batch_size) {
            if store.delete(&entry.key).await? {
                debug!(key = %entry.key, "Evicted expired cache entry");
                removed += 1;
            }
        }

        if removed > 0 {
            metrics::record_eviction(store.namespace(), "expired", removed);
        }
        Ok(removed)
    }

    /// Delete least-recently-read entries while usage is too high.
    ///
    /// Does nothing below `high_water`. Otherwise deletes in ascending
    /// `(accessed_at, key)` order, re-estimating after every deletion, and
    /// stops as soon as the ratio is at or below `low_water` or the batch is
    /// used up.
    pub async fn evict_lru(&self, store: &CacheStore, estimator: &dyn QuotaEstimator) -> Result<usize> {
        let estimate = estimator.estimate().await?;
        if estimate.ratio() < self.high_water {
            return Ok(0);
        }

        info!(
            namespace = store.namespace(),
            ratio = %format!("{:.3}", estimate.ratio()),
            "Storage usage above high-water mark, running LRU eviction"
        );

        let mut candidates = store.entries().await?;
        candidates.sort_by(|a, b| {
            a.accessed_at
                .cmp(&b.accessed_at)
                .then_with(|| a.key.cmp(&b.key))
        });

        let mut removed = 0;
        for entry in candidates.into_iter().take(self.batch_size) {
            if store.delete(&entry.key).await? {
                debug!(key = %entry.key, "Evicted least recently used cache entry");
                removed += 1;
            }
            if estimator.estimate().await?.ratio() <= self.low_water {
                break;
            }
        }

        if removed > 0 {
            metrics::record_eviction(store.namespace(), "lru", removed);
        }
        Ok(removed)
    }

    /// Expiry sweep followed by the quota sweep.
    pub async fn run(&self, store: &CacheStore, estimator: &dyn QuotaEstimator) -> Result<EvictionReport> {
        let report = EvictionReport {
            expired: self.sweep_expired(store).await?,
            lru: self.evict_lru(store, estimator).await?,
        };
        if report.total() > 0 {
            info!(
                namespace = store.namespace(),
                expired = report.expired,
                lru = report.lru,
                "Cache eviction pass finished"
            );
        }
        Ok(report)
    }
}
