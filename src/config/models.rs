//! Configuration data structures for repo-gallery.
//!
//! This module defines the schema for the application settings: the local
//! server, the remote image repository, the offline cache and the upstream
//! fetch behaviour.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// The root configuration object for the application.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// HTTP server settings (host, port, workers).
    #[serde(default)]
    pub server: ServerConfig,

    /// Where the page shell comes from and which paths make it up.
    #[serde(default)]
    pub site: SiteConfig,

    /// Remote repository holding the images.
    #[serde(default)]
    pub repo: RepoConfig,

    /// Offline cache location, namespaces and eviction thresholds.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Upstream HTTP behaviour (timeouts, retries, fallback image).
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Logging and observability settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings for the built-in HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The IP address or hostname the server should bind to.
    /// Default: `127.0.0.1`
    #[serde(default = "default_host")]
    pub host: String,

    /// The port number the server should listen on.
    /// Default: `8080`
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of tokio worker threads.
    /// Default: Number of logical CPU cores.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

/// Page shell settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Base URL the core assets are revalidated against. When unset the
    /// assets bundled into the binary act as the origin.
    #[serde(default)]
    pub origin_url: Option<String>,

    /// Exact request paths treated as core assets.
    /// Default: `/`, `/index.html`, `/app.js`, `/style.css`
    #[serde(default = "default_core_assets")]
    pub core_assets: Vec<String>,
}

/// Remote repository listing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoConfig {
    #[serde(default = "default_owner")]
    pub owner: String,

    #[serde(default = "default_repo_name")]
    pub name: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    /// Directory inside the repository to list. Empty means the root.
    #[serde(default)]
    pub path: String,

    /// Contents API base.
    /// Default: `https://api.github.com`
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Raw download base.
    /// Default: `https://raw.githubusercontent.com`
    #[serde(default = "default_raw_base_url")]
    pub raw_base_url: String,

    /// Allowed image extensions, compared case-insensitively.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Walk subdirectories as well.
    #[serde(default)]
    pub recursive: bool,

    /// Extra attempts after a rate-limit response. `0` reports the first
    /// rate-limit to the user straight away.
    #[serde(default)]
    pub rate_limit_retries: u32,
}

/// Offline cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Root directory; each namespace is a subdirectory.
    /// Default: `<platform cache dir>/repo-gallery`
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    /// Namespace holding the page shell. Bump to invalidate on upgrade.
    #[serde(default = "default_core_namespace")]
    pub core_namespace: String,

    /// Namespace holding image blobs.
    #[serde(default = "default_image_namespace")]
    pub image_namespace: String,

    /// TTL applied to cached images, in days. `0` keeps them forever.
    /// Default: `180`
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u64,

    /// Storage budget for the cache root in bytes. `0` derives the budget
    /// from the disk holding the cache root, see `quota_fraction`.
    #[serde(default)]
    pub quota_bytes: u64,

    /// Share of the cache disk the cache may grow to when `quota_bytes` is
    /// `0`: this fraction of the cache's own usage plus the free space.
    /// Default: `0.6`
    #[serde(default = "default_quota_fraction")]
    pub quota_fraction: f64,

    /// Usage ratio at which the LRU sweep starts.
    /// Default: `0.8`
    #[serde(default = "default_high_water")]
    pub high_water: f64,

    /// Usage ratio at which the LRU sweep stops.
    /// Default: `0.7`
    #[serde(default = "default_low_water")]
    pub low_water: f64,

    /// Maximum deletions per sweep pass.
    /// Default: `50`
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Interval between scheduled sweeps, in seconds.
    /// Default: `43200` (12 hours)
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

/// Settings for upstream HTTP calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Request timeout in seconds.
    /// Default: `60`
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Connect timeout in seconds.
    /// Default: `10`
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Attempts made to write a fetched blob into the cache.
    /// Default: `5`
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// First backoff delay between write attempts, in milliseconds.
    /// Default: `2000`
    #[serde(default = "default_retry_initial_delay")]
    pub retry_initial_delay_ms: u64,

    /// Upper bound on a single backoff delay, in milliseconds.
    /// Default: `30000`
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_ms: u64,

    /// Failed writes after which one quota eviction pass runs.
    /// Default: `3`
    #[serde(default = "default_evict_after_failures")]
    pub evict_after_failures: u32,

    /// Placeholder served when an image cannot be fetched. When empty the
    /// bundled placeholder is used.
    #[serde(default = "default_fallback_image_url")]
    pub fallback_image_url: String,

    /// Background image downloads (`CACHE_IMG`, prefetch) allowed at once.
    /// Default: `6`
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,
}

/// Settings for application logging and output format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum log level (`trace`, `debug`, `info`, `warn`, `error`).
    /// Default: `info`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format for logs (`pretty`, `json`, `compact`).
    /// Default: `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl CacheConfig {
    /// TTL for image entries, `None` when images never expire.
    pub fn image_ttl(&self) -> Option<Duration> {
        match self.max_age_days {
            0 => None,
            days => Some(Duration::from_secs(days * 24 * 60 * 60)),
        }
    }

    /// Fixed budget, `None` when it is derived from the disk.
    pub fn quota(&self) -> Option<u64> {
        match self.quota_bytes {
            0 => None,
            bytes => Some(bytes),
        }
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }
}

impl FetchConfig {
    pub fn fallback_url(&self) -> Option<&str> {
        let url = self.fallback_image_url.trim();
        if url.is_empty() {
            None
        } else {
            Some(url)
        }
    }
}

// Default trait implementations linking to custom logic

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: default_workers(),
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            origin_url: None,
            core_assets: default_core_assets(),
        }
    }
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            name: default_repo_name(),
            branch: default_branch(),
            path: String::new(),
            api_base_url: default_api_base_url(),
            raw_base_url: default_raw_base_url(),
            extensions: default_extensions(),
            recursive: false,
            rate_limit_retries: 0,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            core_namespace: default_core_namespace(),
            image_namespace: default_image_namespace(),
            max_age_days: default_max_age_days(),
            quota_bytes: 0,
            quota_fraction: default_quota_fraction(),
            high_water: default_high_water(),
            low_water: default_low_water(),
            batch_size: default_batch_size(),
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            connect_timeout_seconds: default_connect_timeout(),
            retry_count: default_retry_count(),
            retry_initial_delay_ms: default_retry_initial_delay(),
            retry_max_delay_ms: default_retry_max_delay(),
            evict_after_failures: default_evict_after_failures(),
            fallback_image_url: default_fallback_image_url(),
            max_concurrent_downloads: default_max_concurrent_downloads(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Helper functions for serde defaults and shared constants
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_core_assets() -> Vec<String> {
    ["/", "/index.html", "/app.js", "/style.css"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_owner() -> String {
    "25eqsg3f08-stack".to_string()
}

fn default_repo_name() -> String {
    "Rua_de_macau_Photos".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_raw_base_url() -> String {
    "https://raw.githubusercontent.com".to_string()
}

fn default_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "webp", "gif"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("repo-gallery")
}

fn default_core_namespace() -> String {
    "core-cache-v1".to_string()
}

fn default_image_namespace() -> String {
    "img-cache-v1".to_string()
}

fn default_max_age_days() -> u64 {
    180
}

fn default_quota_fraction() -> f64 {
    0.6
}

fn default_high_water() -> f64 {
    0.8
}

fn default_low_water() -> f64 {
    0.7
}

fn default_batch_size() -> usize {
    50
}

fn default_cleanup_interval() -> u64 {
    12 * 60 * 60
}

fn default_timeout() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_retry_count() -> u32 {
    5
}

fn default_retry_initial_delay() -> u64 {
    2000
}

fn default_retry_max_delay() -> u64 {
    30_000
}

fn default_evict_after_failures() -> u32 {
    3
}

fn default_max_concurrent_downloads() -> usize {
    6
}

fn default_fallback_image_url() -> String {
    "https://picsum.photos/id/1005/800/500".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
