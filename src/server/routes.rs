// HTTP routes configuration
// Author: kelexine (https://github.com/kelexine)

use super::handlers::{
    asset_handler, cache_size_handler, clear_cache_handler, health_handler, image_handler,
    images_handler, message_handler, metrics_handler, prefetch_handler,
};
use super::middleware::{no_store, request_id_layers};
use crate::config::AppConfig;
use crate::listing::ListingClient;
use crate::worker::ServiceWorker;
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub worker: Arc<ServiceWorker>,
    pub listing: Arc<ListingClient>,
}

pub fn create_router(config: AppConfig, worker: Arc<ServiceWorker>, listing: ListingClient) -> Router {
    let state = AppState {
        config,
        worker,
        listing: Arc::new(listing),
    };

    let (set_request_id, propagate_request_id) = request_id_layers();

    let api = Router::new()
        .route("/api/images", get(images_handler))
        .route("/api/prefetch", post(prefetch_handler))
        .route("/api/cache", delete(clear_cache_handler))
        .route("/api/cache/size", get(cache_size_handler))
        .route("/sw/message", post(message_handler))
        .layer(middleware::from_fn(no_store));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/img", get(image_handler))
        .merge(api)
        // Page shell and pass-through paths
        .fallback(asset_handler)
        // Messages carry at most a listing of URLs
        .layer(tower_http::limit::RequestBodyLimitLayer::new(2 * 1024 * 1024))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(propagate_request_id)
        .layer(set_request_id)
        .with_state(state)
}
