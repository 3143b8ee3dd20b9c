// Page ↔ worker message protocol
// Author: kelexine (https://github.com/kelexine)

use crate::error::{GalleryError, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Messages a page posts to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Cache one image now, outside the fetch flow.
    CacheImg { url: String },
    /// Ask which images are available offline.
    GetCachedImgs,
    /// Replace the worker's copy of the gallery listing.
    UpdateCachedImgs { list: Vec<String> },
}

/// Replies the worker posts back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerReply {
    CachedImgs { list: Vec<String> },
}

/// Accept only absolute http(s) URLs with a host.
pub fn validate_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| GalleryError::InvalidRequest(format!("malformed URL {:?}: {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        scheme => Err(GalleryError::InvalidRequest(format!(
            "unsupported URL scheme {:?} in {:?}",
            scheme, raw
        ))),
    }
}
