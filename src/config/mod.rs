// Configuration module
// Author: kelexine (https://github.com/kelexine)

mod models;

pub use models::*;

use crate::error::{GalleryError, Result};
use config::{Config, Environment, File};
use std::path::{Path, PathBuf};

impl AppConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest)
    /// 2. Config file (`--config` or the default path)
    /// 3. Defaults (lowest)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path.to_path_buf()).required(true),
            None => File::from(Self::default_config_path()).required(false),
        };

        let config = Config::builder()
            // Start with defaults
            .add_source(Config::try_from(&Self::default())?)
            .add_source(file)
            // Override with environment variables, e.g. REPO_GALLERY__CACHE__QUOTA_BYTES
            .add_source(
                Environment::with_prefix("REPO_GALLERY")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("repo.extensions")
                    .with_list_parse_key("site.core_assets")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| GalleryError::Config(e.to_string()))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| GalleryError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the cache and listing code cannot honour.
    pub fn validate(&self) -> Result<()> {
        let cache = &self.cache;
        if !(0.0 < cache.low_water && cache.low_water < cache.high_water && cache.high_water <= 1.0) {
            return Err(GalleryError::Config(format!(
                "cache watermarks must satisfy 0 < low_water < high_water <= 1 (got {} / {})",
                cache.low_water, cache.high_water
            )));
        }
        if !(0.0 < cache.quota_fraction && cache.quota_fraction <= 1.0) {
            return Err(GalleryError::Config(format!(
                "cache.quota_fraction must be in (0, 1] (got {})",
                cache.quota_fraction
            )));
        }
        if cache.batch_size == 0 {
            return Err(GalleryError::Config("cache.batch_size must be positive".to_string()));
        }
        if cache.cleanup_interval_seconds == 0 {
            return Err(GalleryError::Config(
                "cache.cleanup_interval_seconds must be positive".to_string(),
            ));
        }
        if cache.core_namespace == cache.image_namespace {
            return Err(GalleryError::Config(
                "core and image namespaces must differ".to_string(),
            ));
        }
        if self.fetch.retry_count == 0 {
            return Err(GalleryError::Config("fetch.retry_count must be at least 1".to_string()));
        }
        if self.fetch.max_concurrent_downloads == 0 {
            return Err(GalleryError::Config(
                "fetch.max_concurrent_downloads must be positive".to_string(),
            ));
        }
        if self.repo.extensions.is_empty() {
            return Err(GalleryError::Config("repo.extensions must not be empty".to_string()));
        }
        if self.repo.owner.is_empty() || self.repo.name.is_empty() {
            return Err(GalleryError::Config("repo.owner and repo.name are required".to_string()));
        }
        url::Url::parse(&self.repo.raw_base_url)
            .map_err(|e| GalleryError::Config(format!("repo.raw_base_url: {}", e)))?;
        if let Some(origin) = &self.site.origin_url {
            url::Url::parse(origin)
                .map_err(|e| GalleryError::Config(format!("site.origin_url: {}", e)))?;
        }
        Ok(())
    }

    fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".repo-gallery")
            .join("config.toml")
    }
}
