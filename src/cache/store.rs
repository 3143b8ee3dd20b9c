//! Directory-backed key→blob store.
//!
//! Every namespace is a directory under the cache root and every entry is a
//! single record file named after the SHA-256 of its key. Writes go to a
//! temporary file in the same directory and are renamed into place, so a
//! reader sees either the old record or the new one and concurrent writers of
//! the same key resolve to last-write-wins.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use super::clock::{Clock, SystemClock};
use super::models::{CacheEntry, CacheSize, CachedBlob};
use super::record::{self, RecordHeader, ACCESSED_AT_OFFSET, HEADER_LEN};
use crate::error::{GalleryError, Result};
use crate::metrics;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::io::{ErrorKind, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

const RECORD_EXT: &str = "rec";
const TEMP_PREFIX: &str = ".tmp";

/// Set of named stores sharing one root directory.
#[derive(Clone)]
pub struct CacheStorage {
    root: PathBuf,
    clock: Arc<dyn Clock>,
}

impl CacheStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_clock(root, Arc::new(SystemClock))
    }

    pub fn with_clock(root: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            root: root.into(),
            clock,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Open (creating if needed) the store for `name`.
    pub async fn open(&self, name: &str) -> Result<CacheStore> {
        validate_namespace(name)?;
        CacheStore::open(self.root.join(name), name, Arc::clone(&self.clock)).await
    }

    /// Names of every namespace currently on disk.
    pub async fn names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(storage_error("list namespaces", e)),
        };
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| storage_error("list namespaces", e))?
        {
            let is_dir = item
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if is_dir {
                if let Some(name) = item.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Remove a namespace and everything in it. Returns false if it did not exist.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        validate_namespace(name)?;
        match fs::remove_dir_all(self.root.join(name)).await {
            Ok(()) => {
                debug!(namespace = name, "Deleted cache namespace");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(storage_error("delete namespace", e)),
        }
    }
}

/// One namespace of the cache.
#[derive(Clone)]
pub struct CacheStore {
    namespace: String,
    dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    async fn open(dir: PathBuf, namespace: &str, clock: Arc<dyn Clock>) -> Result<Self> {
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| storage_error("create namespace directory", e))?;

        let store = Self {
            namespace: namespace.to_string(),
            dir,
            clock,
        };
        store.remove_stale_temp_files().await;
        Ok(store)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Store or overwrite `key`. A missing or zero `ttl` keeps the entry forever.
    pub async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let now = self.clock.now();
        let expires_at = match ttl.filter(|ttl| !ttl.is_zero()) {
            Some(ttl) => {
                let ttl = chrono::Duration::from_std(ttl)
                    .map_err(|e| GalleryError::InvalidRequest(format!("ttl out of range: {}", e)))?;
                now.checked_add_signed(ttl)
            }
            None => None,
        };

        let entry = CacheEntry {
            key: key.to_string(),
            size: data.len() as u64,
            content_type: content_type.to_string(),
            stored_at: now,
            accessed_at: now,
            expires_at,
        };
        let record = record::encode(&entry, &data)
            .map_err(|e| GalleryError::Storage(format!("encode {}: {}", key, e)))?;

        let dir = self.dir.clone();
        let path = self.record_path(key);
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = tempfile::Builder::new().prefix(TEMP_PREFIX).tempfile_in(&dir)?;
            tmp.write_all(&record)?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| GalleryError::Storage(format!("write task failed: {}", e)))?
        .map_err(|e| storage_error("write entry", e))?;

        debug!(
            namespace = %self.namespace,
            key = key,
            size = entry.size,
            expires_at = ?entry.expires_at,
            "Stored cache entry"
        );
        Ok(())
    }

    /// Fetch `key`. Expired entries are deleted and reported as absent; a hit
    /// refreshes the entry's access time.
    pub async fn get(&self, key: &str) -> Result<Option<CachedBlob>> {
        let path = self.record_path(key);
        let raw = match fs::read(&path).await {
            Ok(raw) => Bytes::from(raw),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_error("read entry", e)),
        };

        let (mut entry, data) = match record::decode(raw) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(namespace = %self.namespace, key = key, "Dropping unreadable cache record: {}", e);
                self.remove_path(&path).await?;
                return Ok(None);
            }
        };
        if entry.key != key {
            return Ok(None);
        }

        let now = self.clock.now();
        if entry.is_expired(now) {
            debug!(namespace = %self.namespace, key = key, "Cache entry expired on read");
            self.remove_path(&path).await?;
            metrics::record_eviction(&self.namespace, "expired", 1);
            return Ok(None);
        }

        self.touch(&path, now).await?;
        entry.accessed_at = now;
        Ok(Some(CachedBlob { entry, data }))
    }

    /// Metadata for `key` without refreshing its access time or checking expiry.
    pub async fn peek(&self, key: &str) -> Result<Option<CacheEntry>> {
        let entry = self.read_entry(&self.record_path(key)).await?;
        Ok(entry.filter(|entry| entry.key == key))
    }

    /// True if `key` is present and not expired.
    pub async fn contains(&self, key: &str) -> Result<bool> {
        let now = self.clock.now();
        Ok(self
            .peek(key)
            .await?
            .map(|entry| !entry.is_expired(now))
            .unwrap_or(false))
    }

    /// Remove `key`. Returns false if nothing was stored under it.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.remove_path(&self.record_path(key)).await
    }

    /// Remove every entry in this namespace, leaving other namespaces alone.
    pub async fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.list_files().await? {
            if is_record(&path) && self.remove_path(&path).await? {
                removed += 1;
            }
        }
        debug!(namespace = %self.namespace, removed = removed, "Cleared cache namespace");
        Ok(removed)
    }

    /// Metadata of every entry, sorted by key. Expired entries are included.
    pub async fn entries(&self) -> Result<Vec<CacheEntry>> {
        let mut entries = Vec::new();
        for path in self.list_files().await? {
            if !is_record(&path) {
                continue;
            }
            if let Some(entry) = self.read_entry(&path).await? {
                entries.push(entry);
            }
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    pub async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries().await?.into_iter().map(|e| e.key).collect())
    }

    /// Total payload bytes and entry count, by full scan.
    pub async fn size(&self) -> Result<CacheSize> {
        let entries = self.entries().await?;
        Ok(CacheSize {
            bytes: entries.iter().map(|e| e.size).sum(),
            entries: entries.len(),
        })
    }

    pub async fn size_bytes(&self) -> Result<u64> {
        Ok(self.size().await?.bytes)
    }

    fn record_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir
            .join(format!("{}.{}", hex::encode(digest), RECORD_EXT))
    }

    async fn touch(&self, path: &Path, now: DateTime<Utc>) -> Result<()> {
        let mut file = match fs::OpenOptions::new().write(true).open(path).await {
            Ok(file) => file,
            // Deleted by a concurrent sweep after we read it.
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(storage_error("open entry for touch", e)),
        };
        file.seek(SeekFrom::Start(ACCESSED_AT_OFFSET))
            .await
            .map_err(|e| storage_error("touch entry", e))?;
        file.write_all(&record::encode_timestamp(now))
            .await
            .map_err(|e| storage_error("touch entry", e))?;
        file.flush()
            .await
            .map_err(|e| storage_error("touch entry", e))?;
        Ok(())
    }

    /// Read only the header and key of a record.
    async fn read_entry(&self, path: &Path) -> Result<Option<CacheEntry>> {
        let mut file = match fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_error("open entry", e)),
        };

        let mut header = [0u8; HEADER_LEN];
        let parsed = match file.read_exact(&mut header).await {
            Ok(_) => RecordHeader::parse(&header),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(record::RecordError::Truncated),
            Err(e) => return Err(storage_error("read entry header", e)),
        };
        let entry = match parsed {
            Ok(header) => {
                let mut meta = vec![0u8; header.meta_len()];
                match file.read_exact(&mut meta).await {
                    Ok(_) => header.entry(&meta),
                    Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                        Err(record::RecordError::Truncated)
                    }
                    Err(e) => return Err(storage_error("read entry key", e)),
                }
            }
            Err(e) => Err(e),
        };

        match entry {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                warn!(namespace = %self.namespace, path = %path.display(), "Dropping unreadable cache record: {}", e);
                drop(file);
                self.remove_path(path).await?;
                Ok(None)
            }
        }
    }

    async fn remove_path(&self, path: &Path) -> Result<bool> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(storage_error("delete entry", e)),
        }
    }

    async fn list_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(storage_error("list entries", e)),
        };
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| storage_error("list entries", e))?
        {
            files.push(item.path());
        }
        Ok(files)
    }

    /// Leftovers from writes interrupted by a crash.
    async fn remove_stale_temp_files(&self) {
        let Ok(files) = self.list_files().await else {
            return;
        };
        for path in files {
            let is_temp = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(TEMP_PREFIX))
                .unwrap_or(false);
            if is_temp {
                let _ = fs::remove_file(&path).await;
            }
        }
    }
}

fn is_record(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXT)
}

fn validate_namespace(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(GalleryError::Storage(format!("invalid namespace name: {:?}", name)))
    }
}

fn storage_error(action: &str, e: std::io::Error) -> GalleryError {
    GalleryError::Storage(format!("failed to {}: {}", action, e))
}
