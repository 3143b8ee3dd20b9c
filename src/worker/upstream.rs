// Network access for the interceptor
// Author: kelexine (https://github.com/kelexine)

use crate::config::FetchConfig;
use crate::error::{GalleryError, Result};
use crate::metrics;
use crate::utils::http::build_client;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Instant;
use tracing::debug;

/// A fully buffered upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_type_or_default(&self) -> &str {
        self.content_type.as_deref().unwrap_or("application/octet-stream")
    }
}

/// Thin wrapper over the shared HTTP client that records fetch metrics.
#[derive(Clone)]
pub struct HttpUpstream {
    http_client: Client,
}

impl HttpUpstream {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        Ok(Self {
            http_client: build_client(config)?,
        })
    }

    /// GET `url` and buffer the body. Only transport failures are errors;
    /// HTTP error statuses come back as responses.
    pub async fn get(&self, kind: &str, url: &str) -> Result<UpstreamResponse> {
        let started = Instant::now();
        let result = self.fetch(url).await;
        let outcome = match &result {
            Ok(response) if response.is_success() => "ok",
            Ok(_) => "error_status",
            Err(_) => "unreachable",
        };
        metrics::record_upstream(kind, outcome, started.elapsed().as_secs_f64());
        result
    }

    async fn fetch(&self, url: &str) -> Result<UpstreamResponse> {
        debug!("Fetching {}", url);
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| GalleryError::Network(format!("{}: {}", url, e)))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let body = response
            .bytes()
            .await
            .map_err(|e| GalleryError::Network(format!("{}: failed to read body: {}", url, e)))?;

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}
