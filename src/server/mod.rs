//! Axum-based HTTP front for the gallery.
//!
//! The server hosts the page shell, the listing endpoint and the worker's
//! message channel. Every page and image request goes through the
//! [`ServiceWorker`](crate::worker::ServiceWorker) so the cache policies
//! apply uniformly.
//!
//! # Components
//!
//! - `handlers`: Individual endpoints (listing, images, messages, cache controls, health, metrics).
//! - `middleware`: Request ID tracking.
//! - `routes`: The router that ties everything together.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod handlers;
mod middleware;
mod routes;

pub use routes::{create_router, AppState};
