//! Cache entry metadata and statistics models.

// Author: kelexine (https://github.com/kelexine)

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata for one cached blob. The payload itself stays on disk until a
/// `get` asks for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Source URL (or asset path); unique within a namespace.
    pub key: String,
    /// Payload length in bytes.
    pub size: u64,
    pub content_type: String,
    pub stored_at: DateTime<Utc>,
    /// Refreshed on every successful read; drives LRU ordering.
    pub accessed_at: DateTime<Utc>,
    /// `None` means the entry never expires.
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// A cache hit: metadata plus payload.
#[derive(Debug, Clone)]
pub struct CachedBlob {
    pub entry: CacheEntry,
    pub data: Bytes,
}

/// Result of one eviction pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EvictionReport {
    /// Entries removed because their TTL had passed.
    pub expired: usize,
    /// Entries removed by the quota-driven LRU sweep.
    pub lru: usize,
}

impl EvictionReport {
    pub fn total(&self) -> usize {
        self.expired + self.lru
    }
}

/// Size of a namespace, reported in the units the page shows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheSize {
    pub bytes: u64,
    pub entries: usize,
}

impl CacheSize {
    pub fn megabytes(&self) -> String {
        format!("{:.2}", self.bytes as f64 / (1024.0 * 1024.0))
    }

    pub fn gigabytes(&self) -> String {
        format!("{:.2}", self.bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
