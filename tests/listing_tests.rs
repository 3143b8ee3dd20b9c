// Repository listing tests against a mock contents API
// Author: kelexine (https://github.com/kelexine)

use mockito::{Matcher, Server};
use repo_gallery::config::{FetchConfig, RepoConfig};
use repo_gallery::error::GalleryError;
use repo_gallery::listing::ListingClient;

fn repo(api: &str) -> RepoConfig {
    RepoConfig {
        owner: "owner".to_string(),
        name: "photos".to_string(),
        api_base_url: api.to_string(),
        raw_base_url: "https://raw.example.com".to_string(),
        ..RepoConfig::default()
    }
}

fn client(api: &str, recursive: bool) -> ListingClient {
    let repo = RepoConfig {
        recursive,
        ..repo(api)
    };
    ListingClient::new(&repo, &FetchConfig::default()).unwrap()
}

fn client_with_retries(api: &str, rate_limit_retries: u32) -> ListingClient {
    let repo = RepoConfig {
        rate_limit_retries,
        ..repo(api)
    };
    ListingClient::new(&repo, &FetchConfig::default()).unwrap()
}

fn file(name: &str, path: &str) -> serde_json::Value {
    serde_json::json!({ "name": name, "path": path, "type": "file", "size": 1024 })
}

#[tokio::test]
async fn test_only_images_are_listed() {
    let mut server = Server::new_async().await;
    let body = serde_json::json!([
        file("a.jpg", "a.jpg"),
        file("b.JPEG", "b.JPEG"),
        file("c.png", "c.png"),
        file("d.webp", "d.webp"),
        file("e.gif", "e.gif"),
        file("README.md", "README.md"),
        { "name": "raw", "path": "raw", "type": "dir" },
    ]);
    let mock = server
        .mock("GET", "/repos/owner/photos/contents/")
        .match_query(Matcher::UrlEncoded("ref".into(), "main".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await;

    let images = client(&server.url(), false).fetch_images().await.unwrap();
    mock.assert_async().await;

    assert_eq!(images.len(), 5);
    assert_eq!(images[0].url, "https://raw.example.com/owner/photos/main/a.jpg");
    assert!(images.iter().all(|item| item.name != "README.md"));
}

#[tokio::test]
async fn test_rate_limited_listing_reports_reset() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/owner/photos/contents/")
        .match_query(Matcher::Any)
        .with_status(403)
        .with_header("x-ratelimit-remaining", "0")
        .with_header("x-ratelimit-reset", "1700000000")
        .with_body(r#"{"message":"API rate limit exceeded"}"#)
        .create_async()
        .await;

    match client(&server.url(), false).fetch_images().await {
        Err(GalleryError::RateLimited { reset_at: Some(at) }) => {
            assert_eq!(at.timestamp(), 1_700_000_000)
        }
        other => panic!("expected rate limit error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rate_limit_retries_then_reports_reset() {
    let mut server = Server::new_async().await;
    // A reset instant in the past means no wait between attempts
    let mock = server
        .mock("GET", "/repos/owner/photos/contents/")
        .match_query(Matcher::Any)
        .with_status(403)
        .with_header("x-ratelimit-remaining", "0")
        .with_header("x-ratelimit-reset", "1700000000")
        .expect(3)
        .create_async()
        .await;

    match client_with_retries(&server.url(), 2).fetch_images().await {
        Err(GalleryError::RateLimited { reset_at: Some(at) }) => {
            assert_eq!(at.timestamp(), 1_700_000_000)
        }
        other => panic!("expected rate limit error, got {:?}", other),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_rate_limit_recovers_on_retry() {
    let mut server = Server::new_async().await;
    let limited = server
        .mock("GET", "/repos/owner/photos/contents/")
        .match_query(Matcher::Any)
        .with_status(403)
        .with_header("x-ratelimit-reset", "1700000000")
        .expect(1)
        .create_async()
        .await;
    let listed = server
        .mock("GET", "/repos/owner/photos/contents/")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(serde_json::json!([file("a.jpg", "a.jpg")]).to_string())
        .expect(1)
        .create_async()
        .await;

    let images = client_with_retries(&server.url(), 2).fetch_images().await.unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].name, "a.jpg");
    limited.assert_async().await;
    listed.assert_async().await;
}

#[tokio::test]
async fn test_missing_repository() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/owner/photos/contents/")
        .match_query(Matcher::Any)
        .with_status(404)
        .with_body(r#"{"message":"Not Found"}"#)
        .create_async()
        .await;

    assert!(matches!(
        client(&server.url(), false).fetch_images().await,
        Err(GalleryError::RepositoryNotFound(_))
    ));
}

#[tokio::test]
async fn test_listing_without_images() {
    let mut server = Server::new_async().await;
    let body = serde_json::json!([file("notes.txt", "notes.txt")]);
    server
        .mock("GET", "/repos/owner/photos/contents/")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(body.to_string())
        .create_async()
        .await;

    assert!(matches!(
        client(&server.url(), false).fetch_images().await,
        Err(GalleryError::NoImages)
    ));
}

#[tokio::test]
async fn test_server_error_is_network_failure() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/owner/photos/contents/")
        .match_query(Matcher::Any)
        .with_status(500)
        .create_async()
        .await;

    assert!(matches!(
        client(&server.url(), false).fetch_images().await,
        Err(GalleryError::Network(_))
    ));
}

#[tokio::test]
async fn test_recursive_walk_descends_into_directories() {
    let mut server = Server::new_async().await;
    let root = serde_json::json!([
        file("z.png", "z.png"),
        { "name": "2024", "path": "2024", "type": "dir" },
    ]);
    let nested = serde_json::json!([file("street 1.jpg", "2024/street 1.jpg")]);
    server
        .mock("GET", "/repos/owner/photos/contents/")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(root.to_string())
        .create_async()
        .await;
    server
        .mock("GET", "/repos/owner/photos/contents/2024")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(nested.to_string())
        .create_async()
        .await;

    let images = client(&server.url(), true).fetch_images().await.unwrap();
    let paths: Vec<&str> = images.iter().map(|item| item.path.as_str()).collect();
    assert_eq!(paths, vec!["2024/street 1.jpg", "z.png"]);
    assert_eq!(
        images[0].url,
        "https://raw.example.com/owner/photos/main/2024/street%201.jpg"
    );
}
