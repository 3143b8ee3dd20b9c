// Remote repository listing
// Author: kelexine (https://github.com/kelexine)

mod client;

pub use client::{parse_reset_header, ListingClient};

use serde::{Deserialize, Serialize};

/// One entry of a contents API directory response.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    #[serde(default)]
    pub size: Option<u64>,
}

/// An image that survived the extension filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageItem {
    pub name: String,
    pub path: String,
    /// Direct download URL; also the cache key.
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Case-insensitive extension check against the allow-list.
pub fn is_image(name: &str, extensions: &[String]) -> bool {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext))
        }
        _ => false,
    }
}
