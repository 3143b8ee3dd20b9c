// Error types for repo-gallery
// Author: kelexine (https://github.com/kelexine)

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    /// Remote host unreachable or answered with an unexpected status.
    #[error("Network error: {0}")]
    Network(String),

    /// The listing API answered 403.
    #[error("Listing API rate limit exceeded{}", format_reset(.reset_at))]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    /// The listing succeeded but nothing survived the extension filter.
    #[error("Repository contains no images")]
    NoImages,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Index {index} out of bounds for {len} images")]
    Index { index: usize, len: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Config parsing error: {0}")]
    ConfigParsing(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn format_reset(reset_at: &Option<DateTime<Utc>>) -> String {
    match reset_at {
        Some(at) => format!(" (resets at {})", at.to_rfc3339()),
        None => String::new(),
    }
}

impl GalleryError {
    /// Text shown in the page status line. Listing and storage failures end
    /// up here instead of tearing the session down.
    pub fn status_message(&self) -> String {
        match self {
            GalleryError::Network(detail) => {
                format!("Could not reach the image repository: {}", detail)
            }
            GalleryError::RateLimited { reset_at: Some(at) } => format!(
                "Listing API rate limit reached, try again after {} UTC",
                at.format("%H:%M:%S")
            ),
            GalleryError::RateLimited { reset_at: None } => {
                "Listing API rate limit reached, reload the page later".to_string()
            }
            GalleryError::RepositoryNotFound(_) => "The image repository does not exist".to_string(),
            GalleryError::NoImages => "The repository has no images".to_string(),
            GalleryError::Storage(detail) => format!("Local image cache unavailable: {}", detail),
            GalleryError::Index { .. } => "Image index out of range".to_string(),
            other => other.to_string(),
        }
    }
}

// Convert GalleryError to HTTP responses for Axum
impl IntoResponse for GalleryError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            GalleryError::Network(_) | GalleryError::Http(_) => (StatusCode::BAD_GATEWAY, "network_error"),
            GalleryError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "rate_limit_error"),
            GalleryError::RepositoryNotFound(_) => (StatusCode::NOT_FOUND, "repository_not_found"),
            GalleryError::NoImages => (StatusCode::NOT_FOUND, "no_images"),
            GalleryError::Storage(_) => (StatusCode::INSUFFICIENT_STORAGE, "storage_error"),
            GalleryError::Index { .. } => (StatusCode::BAD_REQUEST, "index_error"),
            GalleryError::InvalidRequest(_) | GalleryError::Json(_) => {
                (StatusCode::BAD_REQUEST, "invalid_request_error")
            }
            GalleryError::Config(_) | GalleryError::ConfigParsing(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error")
            }
            GalleryError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let retry_after = match &self {
            GalleryError::RateLimited { reset_at: Some(at) } => {
                Some((*at - Utc::now()).num_seconds().max(0))
            }
            _ => None,
        };

        let body = json!({
            "type": "error",
            "error": {
                "type": error_type,
                "message": self.status_message(),
            }
        });

        let mut response = (status, axum::Json(body)).into_response();
        if let Some(seconds) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

pub type Result<T> = std::result::Result<T, GalleryError>;
