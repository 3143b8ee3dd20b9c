// Repository contents listing client
// Author: kelexine (https://github.com/kelexine)

use super::{is_image, ContentEntry, ImageItem};
use crate::config::{FetchConfig, RepoConfig};
use crate::error::{GalleryError, Result};
use crate::metrics;
use crate::utils::http::build_client;
use crate::utils::retry::{delay_until, with_retry, RetryError, RetryPolicy};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, ACCEPT};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lists image files in a remote repository and maps them to raw download URLs.
pub struct ListingClient {
    http_client: Client,
    repo: RepoConfig,
    rate_limit_policy: RetryPolicy,
}

impl ListingClient {
    pub fn new(repo: &RepoConfig, fetch: &FetchConfig) -> Result<Self> {
        Ok(Self {
            http_client: build_client(fetch)?,
            repo: repo.clone(),
            rate_limit_policy: RetryPolicy {
                max_attempts: repo.rate_limit_retries.saturating_add(1),
                initial_interval: Duration::from_secs(1),
                max_interval: Duration::from_secs(60),
                ..RetryPolicy::default()
            },
        })
    }

    /// Contents endpoint for a directory of the configured repository.
    pub fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}?ref={}",
            self.repo.api_base_url.trim_end_matches('/'),
            urlencoding::encode(&self.repo.owner),
            urlencoding::encode(&self.repo.name),
            encode_path(path),
            urlencoding::encode(&self.repo.branch)
        )
    }

    /// Direct download URL for a file of the configured repository.
    pub fn raw_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.repo.raw_base_url.trim_end_matches('/'),
            urlencoding::encode(&self.repo.owner),
            urlencoding::encode(&self.repo.name),
            urlencoding::encode(&self.repo.branch),
            encode_path(path)
        )
    }

    /// Fetch the listing and keep only image files, ordered by path.
    ///
    /// Returns `NoImages` when the listing worked but nothing matched, which
    /// callers must report differently from a fetch failure.
    pub async fn fetch_images(&self) -> Result<Vec<ImageItem>> {
        let result = self.collect_images().await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(GalleryError::NoImages) => "empty",
            Err(GalleryError::RateLimited { .. }) => "rate_limited",
            Err(GalleryError::RepositoryNotFound(_)) => "not_found",
            Err(_) => "error",
        };
        metrics::record_listing(outcome);
        result
    }

    async fn collect_images(&self) -> Result<Vec<ImageItem>> {
        let mut images = Vec::new();
        let mut pending = vec![self.repo.path.trim_matches('/').to_string()];

        while let Some(dir) = pending.pop() {
            for entry in self.list_dir(&dir).await? {
                match entry.entry_type.as_str() {
                    "file" if is_image(&entry.name, &self.repo.extensions) => {
                        images.push(ImageItem {
                            url: self.raw_url(&entry.path),
                            name: entry.name,
                            path: entry.path,
                            size: entry.size,
                        });
                    }
                    "dir" if self.repo.recursive => pending.push(entry.path),
                    _ => {}
                }
            }
        }

        if images.is_empty() {
            info!(
                "Repository {}/{} has no files matching {:?}",
                self.repo.owner, self.repo.name, self.repo.extensions
            );
            return Err(GalleryError::NoImages);
        }

        images.sort_by(|a, b| a.path.cmp(&b.path));
        info!("Found {} images in {}/{}", images.len(), self.repo.owner, self.repo.name);
        Ok(images)
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<ContentEntry>> {
        let url = self.contents_url(path);
        with_retry("Repository listing", &self.rate_limit_policy, |_| self.request_dir(&url)).await
    }

    async fn request_dir(&self, url: &str) -> std::result::Result<Vec<ContentEntry>, RetryError<GalleryError>> {
        debug!("Listing repository contents via {}", url);

        let response = self
            .http_client
            .get(url)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| RetryError::permanent(GalleryError::Network(format!("listing request failed: {}", e))))?;

        let status = response.status();
        match status {
            StatusCode::FORBIDDEN => {
                let reset_at = parse_reset_header(response.headers());
                warn!("Listing API rate limited, reset at {:?}", reset_at);
                return Err(RetryError::Transient {
                    retry_after: reset_at.map(|at| delay_until(at, Utc::now())),
                    error: GalleryError::RateLimited { reset_at },
                });
            }
            StatusCode::NOT_FOUND => {
                return Err(RetryError::permanent(GalleryError::RepositoryNotFound(format!(
                    "{}/{}",
                    self.repo.owner, self.repo.name
                ))));
            }
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(RetryError::permanent(GalleryError::Network(format!(
                    "listing returned HTTP {}: {}",
                    status,
                    body.chars().take(200).collect::<String>()
                ))));
            }
            _ => {}
        }

        let text = response
            .text()
            .await
            .map_err(|e| RetryError::permanent(GalleryError::Network(format!("failed to read listing: {}", e))))?;

        serde_json::from_str::<Vec<ContentEntry>>(&text).map_err(|e| {
            RetryError::permanent(GalleryError::Network(format!("unexpected listing format: {}", e)))
        })
    }
}

/// Reset instant from `x-ratelimit-reset` (epoch seconds).
pub fn parse_reset_header(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    let seconds: i64 = headers
        .get("x-ratelimit-reset")?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()?;
    DateTime::<Utc>::from_timestamp(seconds, 0)
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn client() -> ListingClient {
        let repo = RepoConfig {
            owner: "owner".to_string(),
            name: "photos".to_string(),
            ..RepoConfig::default()
        };
        ListingClient::new(&repo, &FetchConfig::default()).unwrap()
    }

    #[test]
    fn test_unbounded_rate_limit_retries_saturate() {
        let repo = RepoConfig {
            rate_limit_retries: u32::MAX,
            ..RepoConfig::default()
        };
        let client = ListingClient::new(&repo, &FetchConfig::default()).unwrap();
        assert_eq!(client.rate_limit_policy.max_attempts, u32::MAX);
    }

    #[test]
    fn test_raw_url_encodes_segments() {
        assert_eq!(
            client().raw_url("street views/Rua 1.JPG"),
            "https://raw.githubusercontent.com/owner/photos/main/street%20views/Rua%201.JPG"
        );
    }

    #[test]
    fn test_contents_url_for_root() {
        assert_eq!(
            client().contents_url(""),
            "https://api.github.com/repos/owner/photos/contents/?ref=main"
        );
    }

    #[test]
    fn test_parse_reset_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("1700000000"));
        assert_eq!(parse_reset_header(&headers).unwrap().timestamp(), 1_700_000_000);

        headers.insert("x-ratelimit-reset", HeaderValue::from_static("soon"));
        assert!(parse_reset_header(&headers).is_none());
    }
}
