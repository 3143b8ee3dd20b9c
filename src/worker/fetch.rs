// Request interception: routing and the per-class cache policies
// Author: kelexine (https://github.com/kelexine)

use super::assets;
use super::service::ServiceWorker;
use super::upstream::UpstreamResponse;
use super::{Destination, RequestTarget, ResponseSource, WorkerRequest, WorkerResponse};
use crate::cache::{CacheStore, CachedBlob};
use crate::error::{GalleryError, Result};
use crate::listing::is_image;
use crate::metrics;
use axum::http::Method;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

impl ServiceWorker {
    /// Route one request to the matching policy.
    pub async fn handle(self: &Arc<Self>, request: WorkerRequest) -> WorkerResponse {
        if request.method != Method::GET {
            return WorkerResponse::status_only(405, "Method not allowed");
        }

        match request.target {
            RequestTarget::SameOrigin(path) => {
                if self.is_core_asset(&path) {
                    self.handle_core(&path).await
                } else if let Some(url) = self.origin_url(&path) {
                    self.handle_passthrough(&url).await
                } else {
                    WorkerResponse::status_only(404, "Not found")
                }
            }
            RequestTarget::Remote(url) => {
                if !self.allows_image_host(&url) {
                    debug!("Refusing request to {}", url.origin().ascii_serialization());
                    WorkerResponse::status_only(403, "Host not allowed")
                } else if request.destination == Destination::Image || self.looks_like_image(&url) {
                    self.handle_image(&url).await
                } else {
                    self.handle_passthrough(&url).await
                }
            }
        }
    }

    pub fn is_core_asset(&self, path: &str) -> bool {
        self.core_assets.iter().any(|asset| asset == path)
    }

    fn looks_like_image(&self, url: &Url) -> bool {
        url.path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(|name| is_image(name, &self.image_extensions))
            .unwrap_or(false)
    }

    fn origin_url(&self, path: &str) -> Option<Url> {
        self.origin.as_ref().and_then(|origin| origin.join(path).ok())
    }

    /// Cache-first for the page shell. A hit is refreshed from the origin in
    /// the background; the bundled copies never change, so without an origin
    /// there is nothing to refresh.
    async fn handle_core(self: &Arc<Self>, path: &str) -> WorkerResponse {
        if let Some(hit) = self.lookup(&self.core, path).await {
            if self.origin.is_some() {
                let worker = Arc::clone(self);
                let path = path.to_string();
                tokio::spawn(async move { worker.revalidate_core(&path).await });
            }
            return WorkerResponse::from_cache(hit);
        }

        match self.fetch_core(path).await {
            Ok(response) => {
                if response.is_success() {
                    self.store_core(path, &response).await;
                }
                WorkerResponse::from_upstream(response)
            }
            Err(e) => {
                warn!("Core asset {} unavailable: {}", path, e);
                WorkerResponse::offline_page()
            }
        }
    }

    async fn revalidate_core(&self, path: &str) {
        match self.fetch_core(path).await {
            Ok(response) if response.is_success() => {
                if self.store_core(path, &response).await {
                    debug!("Refreshed core asset {}", path);
                }
            }
            Ok(response) => debug!("Keeping cached {}: HTTP {}", path, response.status),
            Err(e) => debug!("Keeping cached {}: {}", path, e),
        }
    }

    /// Core assets come from the configured origin, or from the copies built
    /// into the binary when there is none.
    pub(super) async fn fetch_core(&self, path: &str) -> Result<UpstreamResponse> {
        if let Some(url) = self.origin_url(path) {
            return self.upstream.get("core", url.as_str()).await;
        }
        match assets::bundled(path) {
            Some(asset) => Ok(UpstreamResponse {
                status: 200,
                content_type: Some(asset.content_type.to_string()),
                body: Bytes::from_static(asset.body),
            }),
            None => Err(GalleryError::Network(format!(
                "no origin configured for core asset {}",
                path
            ))),
        }
    }

    /// Cache-first for images. A fresh download is returned right away and
    /// written back in the background; only successful responses are cached.
    async fn handle_image(self: &Arc<Self>, url: &Url) -> WorkerResponse {
        if let Some(hit) = self.lookup(&self.images, url.as_str()).await {
            return WorkerResponse::from_cache(hit);
        }

        match self.upstream.get("image", url.as_str()).await {
            Ok(response) if response.is_success() => {
                let worker = Arc::clone(self);
                let key = url.to_string();
                let stored = response.clone();
                tokio::spawn(async move {
                    worker.store_image(&key, &stored).await;
                });
                WorkerResponse::from_upstream(response)
            }
            Ok(response) => {
                info!("Image {} returned HTTP {}, serving fallback", url, response.status);
                self.fallback_image().await
            }
            Err(e) => {
                info!("Image {} unreachable, serving fallback: {}", url, e);
                self.fallback_image().await
            }
        }
    }

    /// The configured fallback image, cached without expiry, or the bundled
    /// placeholder when that is unavailable too.
    pub(super) async fn fallback_image(&self) -> WorkerResponse {
        let Some(fallback) = self.fallback_url.as_deref() else {
            return WorkerResponse::placeholder();
        };

        if let Some(hit) = self.lookup(&self.images, fallback).await {
            return WorkerResponse::from_cache(hit).with_source(ResponseSource::Fallback);
        }

        match self.upstream.get("fallback", fallback).await {
            Ok(response) if response.is_success() => {
                self.write_with_retry(
                    &self.images,
                    fallback,
                    response.body.clone(),
                    response.content_type_or_default(),
                    None,
                )
                .await;
                WorkerResponse::from_upstream(response).with_source(ResponseSource::Fallback)
            }
            Ok(response) => {
                debug!("Fallback image returned HTTP {}", response.status);
                WorkerResponse::placeholder()
            }
            Err(e) => {
                debug!("Fallback image unreachable: {}", e);
                WorkerResponse::placeholder()
            }
        }
    }

    /// Network only; an offline notice when the network is gone.
    async fn handle_passthrough(&self, url: &Url) -> WorkerResponse {
        match self.upstream.get("passthrough", url.as_str()).await {
            Ok(response) => WorkerResponse::from_upstream(response),
            Err(e) => {
                debug!("Passthrough to {} failed: {}", url, e);
                WorkerResponse::offline_notice()
            }
        }
    }

    /// Read from a namespace, treating storage errors as misses.
    async fn lookup(&self, store: &CacheStore, key: &str) -> Option<CachedBlob> {
        match store.get(key).await {
            Ok(Some(hit)) => {
                metrics::record_cache_op(store.namespace(), "hit");
                Some(hit)
            }
            Ok(None) => {
                metrics::record_cache_op(store.namespace(), "miss");
                None
            }
            Err(e) => {
                warn!("Cache read for {} failed: {}", key, e);
                metrics::record_cache_op(store.namespace(), "miss");
                None
            }
        }
    }
}
