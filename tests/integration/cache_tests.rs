//! Tile cache behavior observed through the HTTP layer and on disk.

use axum::http::StatusCode;

use super::test_utils::{create_jp2, TestServer};

async fn server(capacity: usize) -> TestServer {
    let server = TestServer::new(capacity).await;
    server.add_image("page.jp2", &create_jp2(2000, 1000, 5, &[]));
    server
}

fn tile_uri(reduce: u32) -> String {
    format!("/images/page/region?reduce={}", reduce)
}

async fn cache_hit(server: &TestServer, uri: &str) -> bool {
    let (status, headers, _) = server.get(uri).await;
    assert_eq!(status, StatusCode::OK, "{}", uri);
    headers["x-tile-cache-hit"] == "true"
}

#[tokio::test]
async fn test_eviction_deletes_tile_files() {
    let server = server(2).await;

    for reduce in 1..=4 {
        assert!(!cache_hit(&server, &tile_uri(reduce)).await);
    }
    server.context.delete_pool().wait_idle().await;

    assert_eq!(server.context.cache().len().await, 2);
    assert_eq!(server.tile_files(), 2);
    assert_eq!(server.context.delete_pool().stats().deleted(), 2);
}

#[tokio::test]
async fn test_recently_used_tile_survives_eviction() {
    let server = server(2).await;

    cache_hit(&server, &tile_uri(1)).await;
    cache_hit(&server, &tile_uri(2)).await;
    assert!(cache_hit(&server, &tile_uri(1)).await);
    cache_hit(&server, &tile_uri(3)).await;
    server.context.delete_pool().wait_idle().await;

    assert!(cache_hit(&server, &tile_uri(1)).await);
    assert!(cache_hit(&server, &tile_uri(3)).await);
    assert!(!cache_hit(&server, &tile_uri(2)).await);
}

#[tokio::test]
async fn test_evicted_tile_is_rendered_again() {
    let server = server(1).await;

    cache_hit(&server, &tile_uri(1)).await;
    cache_hit(&server, &tile_uri(2)).await;

    assert!(!cache_hit(&server, &tile_uri(1)).await);
    assert_eq!(server.engine.decode_count(), 3);
}

#[tokio::test]
async fn test_queued_deletion_keeps_rerendered_file() {
    let server = server(1).await;

    cache_hit(&server, &tile_uri(1)).await;
    cache_hit(&server, &tile_uri(2)).await;
    cache_hit(&server, &tile_uri(1)).await;
    server.context.delete_pool().wait_idle().await;

    let cache = server.context.cache();
    assert_eq!(cache.len().await, 1);
    assert_eq!(server.tile_files(), 1);

    assert!(cache_hit(&server, &tile_uri(1)).await);
    assert_eq!(server.engine.decode_count(), 3);
}

#[tokio::test]
async fn test_externally_deleted_tile_is_rendered_again() {
    let server = server(4).await;

    cache_hit(&server, &tile_uri(2)).await;
    for entry in std::fs::read_dir(server.tiles_dir()).unwrap() {
        std::fs::remove_file(entry.unwrap().path()).unwrap();
    }

    assert!(!cache_hit(&server, &tile_uri(2)).await);
    assert_eq!(server.engine.decode_count(), 2);
    assert_eq!(server.tile_files(), 1);

    assert!(cache_hit(&server, &tile_uri(2)).await);
}

#[tokio::test]
async fn test_shutdown_drains_pending_deletions() {
    let server = server(1).await;

    for reduce in 1..=5 {
        cache_hit(&server, &tile_uri(reduce)).await;
    }
    server.context.shutdown().await;

    assert_eq!(server.context.delete_pool().stats().pending(), 0);
    assert_eq!(server.tile_files(), 1);
}

#[tokio::test]
async fn test_tile_files_are_prefixed_by_fingerprint() {
    let server = server(4).await;

    cache_hit(&server, &tile_uri(3)).await;

    let names: Vec<String> = std::fs::read_dir(server.tiles_dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 1);
    let stem = names[0].strip_suffix(".jpg").unwrap();
    let (fingerprint, nonce) = stem.split_once('-').unwrap();
    assert_eq!(fingerprint.len(), 64);
    assert!(fingerprint.chars().all(|c| c.is_ascii_hexdigit()));
    assert!(!nonce.is_empty());
}
