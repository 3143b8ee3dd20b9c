// Shared reqwest client construction
// Author: kelexine (https://github.com/kelexine)

use crate::config::FetchConfig;
use crate::error::{GalleryError, Result};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

pub const USER_AGENT: &str = concat!("repo-gallery/", env!("CARGO_PKG_VERSION"));

/// Build an HTTP client with connection pooling and the configured timeouts.
pub fn build_client(config: &FetchConfig) -> Result<Client> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(config.timeout_seconds))
        .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .use_rustls_tls()
        .build()
        .map_err(|e| GalleryError::Internal(format!("Failed to create HTTP client: {}", e)))?;

    debug!("Created HTTP client with connection pooling and keep-alive");
    Ok(client)
}
