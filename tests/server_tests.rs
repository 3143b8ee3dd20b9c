// Router tests driven through tower::ServiceExt::oneshot
// Author: kelexine (https://github.com/kelexine)

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use mockito::{Matcher, Server, ServerGuard};
use repo_gallery::config::AppConfig;
use repo_gallery::listing::ListingClient;
use repo_gallery::server::create_router;
use repo_gallery::worker::ServiceWorker;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn app(server: &ServerGuard, cache_dir: &std::path::Path) -> Router {
    let mut config = AppConfig::default();
    config.cache.dir = cache_dir.to_path_buf();
    config.cache.quota_bytes = 64 * 1024 * 1024;
    config.fetch.fallback_image_url = String::new();
    config.repo.owner = "owner".to_string();
    config.repo.name = "photos".to_string();
    config.repo.api_base_url = server.url();
    config.repo.raw_base_url = format!("{}/raw", server.url());

    let worker = ServiceWorker::from_config(&config).await.unwrap();
    worker.start().await.unwrap();
    let listing = ListingClient::new(&config.repo, &config.fetch).unwrap();
    create_router(config, worker, listing)
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_shell_served_from_cache() {
    let server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let app = app(&server, dir.path()).await;

    let response = app.oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-served-from"], "cache");
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_images_listing_and_prefetch() {
    let mut server = Server::new_async().await;
    let listing = json!([
        { "name": "a.jpg", "path": "a.jpg", "type": "file", "size": 1 },
        { "name": "b.png", "path": "b.png", "type": "file", "size": 1 },
        { "name": "notes.md", "path": "notes.md", "type": "file", "size": 1 },
    ]);
    server
        .mock("GET", "/repos/owner/photos/contents/")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(listing.to_string())
        .create_async()
        .await;
    server
        .mock("GET", Matcher::Regex(r"^/raw/owner/photos/main/.*$".to_string()))
        .with_status(200)
        .with_header("content-type", "image/jpeg")
        .with_body("IMG")
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let app = app(&server, dir.path()).await;

    let response = app.clone().oneshot(get("/api/images")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    let body = json_body(response).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 2);

    let response = app
        .clone()
        .oneshot(post_json("/api/prefetch", json!({ "start": 1, "count": 5 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(json_body(response).await["queued"], 2);

    let response = app
        .oneshot(post_json("/api/prefetch", json!({ "count": 0 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_listing_failure_still_returns_status_line() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/owner/photos/contents/")
        .match_query(Matcher::Any)
        .with_status(403)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let app = app(&server, dir.path()).await;

    let response = app.oneshot(get("/api/images")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = json_body(response).await;
    assert!(body["items"].as_array().unwrap().is_empty());
    assert!(body["message"].as_str().unwrap().contains("rate limit"));
}

#[tokio::test]
async fn test_message_endpoint() {
    let server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let app = app(&server, dir.path()).await;

    let response = app
        .clone()
        .oneshot(post_json("/sw/message", json!({ "type": "GET_CACHED_IMGS" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body, json!({ "type": "CACHED_IMGS", "list": [] }));

    let response = app
        .clone()
        .oneshot(post_json("/sw/message", json!({ "type": "CACHE_IMG", "url": "nope" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(post_json(
            "/sw/message",
            json!({ "type": "UPDATE_CACHED_IMGS", "list": ["https://example.com/a.jpg"] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_images_only_come_from_the_repository_host() {
    let server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let app = app(&server, dir.path()).await;

    let foreign = "http://169.254.169.254/latest/meta-data/a.jpg";
    let response = app
        .clone()
        .oneshot(get(&format!("/img?url={}", urlencoding::encode(foreign))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(post_json("/sw/message", json!({ "type": "CACHE_IMG", "url": foreign })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cache_size_and_clear() {
    let server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let app = app(&server, dir.path()).await;

    let response = app.clone().oneshot(get("/api/cache/size")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["bytes"], 0);
    assert_eq!(body["mb"], "0.00");

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::DELETE)
                .uri("/api/cache")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["removed"], 0);
}

#[tokio::test]
async fn test_health_and_metrics() {
    let server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let app = app(&server, dir.path()).await;

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(json_body(response).await["status"], "healthy");

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
