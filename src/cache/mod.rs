// Offline cache: namespaced blob store, clock and eviction
// Author: kelexine (https://github.com/kelexine)

pub mod clock;
pub mod eviction;
pub mod models;
pub mod record;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use eviction::{
    DirectoryQuota, DiskSpace, EvictionPolicy, QuotaEstimator, StorageEstimate, SystemDisks,
};
pub use models::{CacheEntry, CacheSize, CachedBlob, EvictionReport};
pub use store::{CacheStorage, CacheStore};
