//! Offline-first request interceptor.
//!
//! `ServiceWorker` sits between the gallery page and the network. It owns two
//! cache namespaces (the page shell and image blobs), walks an
//! install → activate lifecycle, and applies one of three policies to every
//! request it sees:
//!
//! - core assets: cache-first, revalidated in the background
//! - images: cache-first, written back with retries, placeholder on failure
//! - everything else: network only, with an offline notice on failure
//!
//! Author: kelexine (<https://github.com/kelexine>)

pub mod assets;
mod fetch;
pub mod messages;
mod service;
pub mod upstream;

pub use messages::{validate_url, WorkerMessage, WorkerReply};
pub use service::ServiceWorker;
pub use upstream::{HttpUpstream, UpstreamResponse};

use crate::cache::CachedBlob;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::Serialize;
use url::Url;

/// Lifecycle position of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Registered,
    Installing,
    Activating,
    Active,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Registered => "registered",
            WorkerState::Installing => "installing",
            WorkerState::Activating => "activating",
            WorkerState::Active => "active",
        }
    }
}

/// What the page intends to do with the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Document,
    Script,
    Style,
    Image,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestTarget {
    /// A path on the gallery's own origin.
    SameOrigin(String),
    /// An absolute URL on another host.
    Remote(Url),
}

#[derive(Debug, Clone)]
pub struct WorkerRequest {
    pub method: Method,
    pub target: RequestTarget,
    pub destination: Destination,
}

impl WorkerRequest {
    pub fn same_origin(path: impl Into<String>, destination: Destination) -> Self {
        Self {
            method: Method::GET,
            target: RequestTarget::SameOrigin(path.into()),
            destination,
        }
    }

    pub fn image(url: Url) -> Self {
        Self {
            method: Method::GET,
            target: RequestTarget::Remote(url),
            destination: Destination::Image,
        }
    }

    pub fn remote(url: Url) -> Self {
        Self {
            method: Method::GET,
            target: RequestTarget::Remote(url),
            destination: Destination::Other,
        }
    }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Cache,
    Network,
    Fallback,
    Offline,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Cache => "cache",
            ResponseSource::Network => "network",
            ResponseSource::Fallback => "fallback",
            ResponseSource::Offline => "offline",
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl WorkerResponse {
    pub fn from_cache(hit: CachedBlob) -> Self {
        Self {
            status: 200,
            content_type: hit.entry.content_type,
            body: hit.data,
            source: ResponseSource::Cache,
        }
    }

    pub fn from_upstream(response: UpstreamResponse) -> Self {
        Self {
            status: response.status,
            content_type: response.content_type_or_default().to_string(),
            body: response.body,
            source: ResponseSource::Network,
        }
    }

    pub fn with_source(mut self, source: ResponseSource) -> Self {
        self.source = source;
        self
    }

    pub fn offline_page() -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8".to_string(),
            body: Bytes::from_static(assets::OFFLINE_PAGE.as_bytes()),
            source: ResponseSource::Offline,
        }
    }

    pub fn offline_notice() -> Self {
        Self {
            status: 503,
            content_type: "text/plain; charset=utf-8".to_string(),
            body: Bytes::from_static(assets::OFFLINE_NOTICE.as_bytes()),
            source: ResponseSource::Offline,
        }
    }

    pub fn placeholder() -> Self {
        let asset = assets::placeholder();
        Self {
            status: 200,
            content_type: asset.content_type.to_string(),
            body: Bytes::from_static(asset.body),
            source: ResponseSource::Fallback,
        }
    }

    pub fn status_only(status: u16, message: &'static str) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8".to_string(),
            body: Bytes::from_static(message.as_bytes()),
            source: ResponseSource::Network,
        }
    }
}

impl IntoResponse for WorkerResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::BAD_GATEWAY);
        let mut response = (status, self.body).into_response();
        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&self.content_type) {
            headers.insert(header::CONTENT_TYPE, value);
        }
        headers.insert(
            "x-served-from",
            HeaderValue::from_static(self.source.as_str()),
        );
        response
    }
}
