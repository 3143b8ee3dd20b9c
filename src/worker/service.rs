// Service worker lifecycle, shared state and message handling
// Author: kelexine (https://github.com/kelexine)

use super::messages::{validate_url, WorkerMessage, WorkerReply};
use super::upstream::{HttpUpstream, UpstreamResponse};
use super::WorkerState;
use crate::cache::{
    CacheSize, CacheStorage, CacheStore, DirectoryQuota, EvictionPolicy, EvictionReport,
    QuotaEstimator,
};
use crate::config::AppConfig;
use crate::error::{GalleryError, Result};
use crate::metrics;
use crate::utils::retry::{with_retry, RetryError, RetryPolicy};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use url::{Origin, Url};

/// The offline cache owner. Cheap to share behind an `Arc`; background
/// revalidation and write-back tasks hold their own clone.
pub struct ServiceWorker {
    pub(super) storage: CacheStorage,
    pub(super) core: CacheStore,
    pub(super) images: CacheStore,
    pub(super) upstream: HttpUpstream,
    pub(super) estimator: Arc<dyn QuotaEstimator>,
    pub(super) policy: EvictionPolicy,
    pub(super) retry: RetryPolicy,
    pub(super) evict_after_failures: u32,
    pub(super) image_ttl: Option<Duration>,
    pub(super) core_assets: Vec<String>,
    pub(super) origin: Option<Url>,
    pub(super) fallback_url: Option<String>,
    pub(super) image_extensions: Vec<String>,
    /// Hosts images may be fetched from: the raw file host and the fallback.
    image_origins: Vec<Origin>,
    downloads: Arc<Semaphore>,
    state: RwLock<WorkerState>,
    known_listing: RwLock<Vec<String>>,
}

impl ServiceWorker {
    /// Build a worker over the configured cache directory, measuring quota
    /// usage from the files on disk.
    pub async fn from_config(config: &AppConfig) -> Result<Arc<Self>> {
        let storage = CacheStorage::new(&config.cache.dir);
        let estimator = Arc::new(DirectoryQuota::from_config(&config.cache));
        Self::new(config, storage, estimator).await
    }

    pub async fn new(
        config: &AppConfig,
        storage: CacheStorage,
        estimator: Arc<dyn QuotaEstimator>,
    ) -> Result<Arc<Self>> {
        let core = storage.open(&config.cache.core_namespace).await?;
        let images = storage.open(&config.cache.image_namespace).await?;

        let origin = match &config.site.origin_url {
            Some(origin) => Some(
                Url::parse(origin)
                    .map_err(|e| GalleryError::Config(format!("site.origin_url: {}", e)))?,
            ),
            None => None,
        };

        let raw_base = Url::parse(&config.repo.raw_base_url)
            .map_err(|e| GalleryError::Config(format!("repo.raw_base_url: {}", e)))?;
        let mut image_origins = vec![raw_base.origin()];
        if let Some(fallback) = config.fetch.fallback_url() {
            let fallback = Url::parse(fallback)
                .map_err(|e| GalleryError::Config(format!("fetch.fallback_image_url: {}", e)))?;
            image_origins.push(fallback.origin());
        }

        Ok(Arc::new(Self {
            storage,
            core,
            images,
            upstream: HttpUpstream::new(&config.fetch)?,
            estimator,
            policy: EvictionPolicy::from(&config.cache),
            retry: RetryPolicy::from(&config.fetch),
            evict_after_failures: config.fetch.evict_after_failures,
            image_ttl: config.cache.image_ttl(),
            core_assets: config.site.core_assets.clone(),
            origin,
            fallback_url: config.fetch.fallback_url().map(|s| s.to_string()),
            image_extensions: config.repo.extensions.clone(),
            image_origins,
            downloads: Arc::new(Semaphore::new(config.fetch.max_concurrent_downloads.max(1))),
            state: RwLock::new(WorkerState::Registered),
            known_listing: RwLock::new(Vec::new()),
        }))
    }

    pub fn state(&self) -> WorkerState {
        *self.state.read()
    }

    fn set_state(&self, state: WorkerState) {
        debug!("Worker state: {}", state.as_str());
        *self.state.write() = state;
    }

    pub fn images(&self) -> &CacheStore {
        &self.images
    }

    pub fn core(&self) -> &CacheStore {
        &self.core
    }

    /// Run install then activate.
    pub async fn start(&self) -> Result<EvictionReport> {
        let cached = self.install().await;
        info!("Installed {}/{} core assets", cached, self.core_assets.len());
        self.activate().await
    }

    /// Pre-populate the core namespace. Assets that cannot be fetched are
    /// logged and skipped; they will be cached on first use instead.
    pub async fn install(&self) -> usize {
        self.set_state(WorkerState::Installing);

        let results = futures::future::join_all(self.core_assets.iter().map(|path| async move {
            match self.fetch_core(path).await {
                Ok(response) if response.is_success() => self.store_core(path, &response).await,
                Ok(response) => {
                    warn!("Core asset {} returned HTTP {}", path, response.status);
                    false
                }
                Err(e) => {
                    warn!("Failed to fetch core asset {}: {}", path, e);
                    false
                }
            }
        }))
        .await;

        results.into_iter().filter(|stored| *stored).count()
    }

    /// Drop namespaces from older versions, run the first eviction pass and
    /// start serving.
    pub async fn activate(&self) -> Result<EvictionReport> {
        self.set_state(WorkerState::Activating);

        for name in self.storage.names().await? {
            if name != self.core.namespace() && name != self.images.namespace() {
                info!("Deleting stale cache namespace {}", name);
                self.storage.delete(&name).await?;
            }
        }

        let report = self.run_eviction().await;
        self.set_state(WorkerState::Active);
        Ok(report)
    }

    /// Periodic expiry + quota sweep. The first run happens one period after
    /// the call since activation already swept.
    pub fn spawn_maintenance(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let worker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                info!("Running scheduled cache cleanup");
                worker.run_eviction().await;
            }
        })
    }

    /// Expiry sweep plus quota sweep on the image namespace. Failures are
    /// logged; eviction never takes the worker down.
    pub async fn run_eviction(&self) -> EvictionReport {
        let report = match self.policy.run(&self.images, self.estimator.as_ref()).await {
            Ok(report) => report,
            Err(e) => {
                error!("Cache eviction failed: {}", e);
                EvictionReport::default()
            }
        };
        self.refresh_size_metric().await;
        report
    }

    /// Quota sweep alone, run before new image writes.
    pub(super) async fn evict_for_quota(&self) -> usize {
        match self.policy.evict_lru(&self.images, self.estimator.as_ref()).await {
            Ok(evicted) => evicted,
            Err(e) => {
                warn!("Quota eviction failed: {}", e);
                0
            }
        }
    }

    /// Whether images may be fetched from this URL's origin.
    pub fn allows_image_host(&self, url: &Url) -> bool {
        self.image_origins.contains(&url.origin())
    }

    /// Refuse a write that would push usage past the quota.
    async fn ensure_room(&self, len: u64) -> Result<()> {
        let estimate = self.estimator.estimate().await?;
        match estimate.quota {
            Some(quota) if estimate.usage.saturating_add(len) > quota => {
                Err(GalleryError::Storage(format!(
                    "quota exceeded: {} bytes used, {} more requested, {} allowed",
                    estimate.usage, len, quota
                )))
            }
            _ => Ok(()),
        }
    }

    /// Write a blob, retrying with exponential backoff. A write fails when
    /// it would not fit the quota. After `evict_after_failures` failed
    /// attempts one eviction pass runs before the next try.
    pub async fn write_with_retry(
        &self,
        store: &CacheStore,
        key: &str,
        body: Bytes,
        content_type: &str,
        ttl: Option<Duration>,
    ) -> bool {
        let evict_before_attempt = self.evict_after_failures.saturating_add(1);
        let result = with_retry("Cache write", &self.retry, |attempt| {
            let body = body.clone();
            async move {
                if attempt == evict_before_attempt {
                    info!("Cache write for {} keeps failing, evicting before retry", key);
                    metrics::record_cache_op(store.namespace(), "evict_before_retry");
                    self.run_eviction().await;
                }
                self.ensure_room(body.len() as u64)
                    .await
                    .map_err(RetryError::transient)?;
                store
                    .put(key, body, content_type, ttl)
                    .await
                    .map_err(RetryError::transient)
            }
        })
        .await;

        match result {
            Ok(()) => {
                metrics::record_cache_op(store.namespace(), "store");
                true
            }
            Err(e) => {
                metrics::record_cache_op(store.namespace(), "store_failed");
                error!("Giving up caching {}: {}", key, e);
                false
            }
        }
    }

    pub(super) async fn store_image(&self, key: &str, response: &UpstreamResponse) -> bool {
        self.evict_for_quota().await;
        let stored = self
            .write_with_retry(
                &self.images,
                key,
                response.body.clone(),
                response.content_type_or_default(),
                self.image_ttl,
            )
            .await;
        if stored {
            self.refresh_size_metric().await;
        }
        stored
    }

    pub(super) async fn store_core(&self, path: &str, response: &UpstreamResponse) -> bool {
        self.write_with_retry(
            &self.core,
            path,
            response.body.clone(),
            response.content_type_or_default(),
            None,
        )
        .await
    }

    /// Handle a page message. `CACHE_IMG` is accepted immediately and
    /// completed in the background, at most `fetch.max_concurrent_downloads`
    /// downloads at a time.
    pub async fn handle_message(self: &Arc<Self>, message: WorkerMessage) -> Result<Option<WorkerReply>> {
        match message {
            WorkerMessage::CacheImg { url } => {
                let url = self.image_url(&url)?;
                let worker = Arc::clone(self);
                tokio::spawn(async move {
                    let Ok(_permit) = worker.downloads.acquire().await else {
                        return;
                    };
                    match worker.cache_image(url.as_str()).await {
                        Ok(stored) => info!("Cache request for {}: {}", url, if stored { "stored" } else { "not stored" }),
                        Err(e) => warn!("Cache request for {} failed: {}", url, e),
                    }
                });
                Ok(None)
            }
            WorkerMessage::GetCachedImgs => Ok(Some(WorkerReply::CachedImgs {
                list: self.cached_images().await?,
            })),
            WorkerMessage::UpdateCachedImgs { list } => {
                let kept = self.update_known_listing(list);
                debug!("Worker now knows {} gallery images", kept);
                Ok(None)
            }
        }
    }

    /// Fetch one image and write it to the image namespace. Returns false
    /// when the host answered with an error status or the write gave up; in
    /// the first case the fallback image is cached instead so the gallery
    /// still has something to show offline.
    pub async fn cache_image(&self, url: &str) -> Result<bool> {
        let url = self.image_url(url)?;
        let response = self.upstream.get("image", url.as_str()).await?;
        if !response.is_success() {
            warn!("Not caching {}: HTTP {}", url, response.status);
            self.fallback_image().await;
            return Ok(false);
        }
        Ok(self.store_image(url.as_str(), &response).await)
    }

    fn image_url(&self, raw: &str) -> Result<Url> {
        let url = validate_url(raw)?;
        if !self.allows_image_host(&url) {
            return Err(GalleryError::InvalidRequest(format!(
                "images are not fetched from {}",
                url.origin().ascii_serialization()
            )));
        }
        Ok(url)
    }

    /// Non-expired cached image URLs. Ordered like the known listing when
    /// the page has pushed one, otherwise sorted.
    pub async fn cached_images(&self) -> Result<Vec<String>> {
        let now = self.images.now();
        let cached: HashSet<String> = self
            .images
            .entries()
            .await?
            .into_iter()
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.key)
            .collect();

        let known = self.known_listing.read().clone();
        if known.is_empty() {
            let mut list: Vec<String> = cached
                .into_iter()
                .filter(|key| Some(key.as_str()) != self.fallback_url.as_deref())
                .collect();
            list.sort();
            Ok(list)
        } else {
            Ok(known.into_iter().filter(|url| cached.contains(url)).collect())
        }
    }

    pub fn known_listing(&self) -> Vec<String> {
        self.known_listing.read().clone()
    }

    /// Replace the known listing, keeping only well-formed unique URLs.
    pub fn update_known_listing(&self, list: Vec<String>) -> usize {
        let mut seen = HashSet::new();
        let listing: Vec<String> = list
            .into_iter()
            .filter(|url| validate_url(url).is_ok() && seen.insert(url.clone()))
            .collect();
        let count = listing.len();
        *self.known_listing.write() = listing;
        count
    }

    pub async fn image_cache_size(&self) -> Result<CacheSize> {
        let size = self.images.size().await?;
        metrics::update_cache_bytes(self.images.namespace(), size.bytes);
        Ok(size)
    }

    /// Remove every cached image; the page shell stays cached.
    pub async fn clear_images(&self) -> Result<usize> {
        let removed = self.images.clear().await?;
        metrics::record_eviction(self.images.namespace(), "cleared", removed);
        metrics::update_cache_bytes(self.images.namespace(), 0);
        info!("Cleared {} cached images", removed);
        Ok(removed)
    }

    async fn refresh_size_metric(&self) {
        if let Err(e) = self.image_cache_size().await {
            debug!("Could not measure image cache: {}", e);
        }
    }
}
