// HTTP request handlers
// Author: kelexine (https://github.com/kelexine)

use super::routes::AppState;
use crate::error::Result;
use crate::gallery::{validate_prefetch_count, GalleryState};
use crate::listing::ImageItem;
use crate::metrics::gather_metrics;
use crate::worker::{
    validate_url, Destination, RequestTarget, WorkerMessage, WorkerRequest, WorkerResponse,
    WorkerState,
};
use axum::{
    extract::{Query, State},
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: HashMap<String, HealthCheck>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: String,
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut checks = HashMap::new();
    let mut overall_status = HealthStatus::Healthy;

    let worker_state = state.worker.state();
    let worker_check = if worker_state == WorkerState::Active {
        HealthCheck {
            status: "ok".to_string(),
            message: "Worker active".to_string(),
        }
    } else {
        overall_status = HealthStatus::Degraded;
        HealthCheck {
            status: "warning".to_string(),
            message: format!("Worker {}", worker_state.as_str()),
        }
    };
    checks.insert("worker".to_string(), worker_check);

    let cache_check = match state.worker.image_cache_size().await {
        Ok(size) => HealthCheck {
            status: "ok".to_string(),
            message: format!("{} images, {} MB", size.entries, size.megabytes()),
        },
        Err(e) => {
            overall_status = HealthStatus::Unhealthy;
            HealthCheck {
                status: "error".to_string(),
                message: e.to_string(),
            }
        }
    };
    checks.insert("image_cache".to_string(), cache_check);

    checks.insert(
        "repository".to_string(),
        HealthCheck {
            status: "ok".to_string(),
            message: format!(
                "{}/{}@{}",
                state.config.repo.owner, state.config.repo.name, state.config.repo.branch
            ),
        },
    );

    Json(HealthResponse {
        status: overall_status,
        checks,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        gather_metrics(),
    )
}

#[derive(Debug, Serialize)]
pub struct ImagesResponse {
    pub items: Vec<ImageItem>,
    pub message: String,
}

/// Listing for the page. Failures still answer with a JSON body carrying the
/// status line so the page can fall back to cached images.
pub async fn images_handler(State(state): State<AppState>) -> Response {
    match state.listing.fetch_images().await {
        Ok(items) => {
            let urls = items.iter().map(|item| item.url.clone()).collect();
            state.worker.update_known_listing(urls);
            let message = format!("{} images", items.len());
            Json(ImagesResponse { items, message }).into_response()
        }
        Err(e) => {
            warn!("Listing failed: {}", e);
            let message = e.status_message();
            let status = e.into_response().status();
            (
                status,
                Json(ImagesResponse {
                    items: Vec::new(),
                    message,
                }),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    pub url: String,
}

/// Image requests from the page, routed through the cache.
pub async fn image_handler(
    State(state): State<AppState>,
    Query(query): Query<ImageQuery>,
) -> Result<WorkerResponse> {
    let url = validate_url(&query.url)?;
    Ok(state.worker.handle(WorkerRequest::image(url)).await)
}

/// Page → worker messages. Replies come back as JSON; fire-and-forget
/// messages are acknowledged with 202.
pub async fn message_handler(
    State(state): State<AppState>,
    Json(message): Json<WorkerMessage>,
) -> Result<Response> {
    match state.worker.handle_message(message).await? {
        Some(reply) => Ok(Json(reply).into_response()),
        None => Ok(StatusCode::ACCEPTED.into_response()),
    }
}

#[derive(Debug, Deserialize)]
pub struct PrefetchRequest {
    #[serde(default)]
    pub start: usize,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct PrefetchResponse {
    pub queued: usize,
}

/// Queue the next `count` images (wrapping) for caching.
pub async fn prefetch_handler(
    State(state): State<AppState>,
    Json(request): Json<PrefetchRequest>,
) -> Result<(StatusCode, Json<PrefetchResponse>)> {
    let count = validate_prefetch_count(request.count)?;
    let gallery = GalleryState::new(state.worker.known_listing())?;
    let window: Vec<String> = gallery
        .window(request.start, count)?
        .into_iter()
        .map(str::to_string)
        .collect();

    for url in &window {
        state
            .worker
            .handle_message(WorkerMessage::CacheImg { url: url.clone() })
            .await?;
    }
    info!("Queued {} images for caching from index {}", window.len(), request.start);

    Ok((
        StatusCode::ACCEPTED,
        Json(PrefetchResponse {
            queued: window.len(),
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct CacheSizeResponse {
    pub bytes: u64,
    pub entries: usize,
    pub mb: String,
    pub gb: String,
}

pub async fn cache_size_handler(State(state): State<AppState>) -> Result<Json<CacheSizeResponse>> {
    let size = state.worker.image_cache_size().await?;
    Ok(Json(CacheSizeResponse {
        bytes: size.bytes,
        entries: size.entries,
        mb: size.megabytes(),
        gb: size.gigabytes(),
    }))
}

#[derive(Debug, Serialize)]
pub struct ClearCacheResponse {
    pub removed: usize,
}

pub async fn clear_cache_handler(State(state): State<AppState>) -> Result<Json<ClearCacheResponse>> {
    let removed = state.worker.clear_images().await?;
    Ok(Json(ClearCacheResponse { removed }))
}

/// Everything else on our origin: the page shell and, when an origin is
/// configured, pass-through paths.
pub async fn asset_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
) -> WorkerResponse {
    let path = uri.path().to_string();
    let destination = destination_for(&path);
    state
        .worker
        .handle(WorkerRequest {
            method,
            target: RequestTarget::SameOrigin(path),
            destination,
        })
        .await
}

fn destination_for(path: &str) -> Destination {
    if path == "/" || path.ends_with(".html") {
        Destination::Document
    } else if path.ends_with(".js") {
        Destination::Script
    } else if path.ends_with(".css") {
        Destination::Style
    } else {
        Destination::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_for_paths() {
        assert_eq!(destination_for("/"), Destination::Document);
        assert_eq!(destination_for("/index.html"), Destination::Document);
        assert_eq!(destination_for("/app.js"), Destination::Script);
        assert_eq!(destination_for("/style.css"), Destination::Style);
        assert_eq!(destination_for("/favicon.ico"), Destination::Other);
    }
}
