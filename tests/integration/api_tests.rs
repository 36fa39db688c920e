//! HTTP API tests.
//!
//! Requests go through the full router (resolver, extractor, tile service)
//! with a mock engine doing the pixel work.

use axum::http::{header, StatusCode};

use super::test_utils::{create_jp2, is_valid_jpeg, json, TestServer};

const PAGE_XML: &str = "<page><title>Folio 1</title></page>";

async fn server_with_page() -> TestServer {
    let server = TestServer::new(16).await;
    server.add_image("page.jp2", &create_jp2(2000, 1000, 5, &[PAGE_XML]));
    server
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let server = TestServer::new(16).await;

    let (status, _, body) = server.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["engine"], "mock");
    assert_eq!(body["cached_tiles"], 0);
    assert!(body["version"].is_string());
}

// =============================================================================
// Info
// =============================================================================

#[tokio::test]
async fn test_info_reports_metadata_and_levels() {
    let server = server_with_page().await;

    let (status, headers, body) = server.get("/images/page/info").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    let body = json(&body);
    assert_eq!(body["id"], "page");
    assert_eq!(body["width"], 2000);
    assert_eq!(body["height"], 1000);
    assert_eq!(body["levels"], 5);
    assert_eq!(body["channels"], 3);
    assert_eq!(body["bit_depth"], 8);
    assert_eq!(body["resolution_levels"], 5);
}

#[tokio::test]
async fn test_info_accepts_explicit_extension() {
    let server = server_with_page().await;

    let (status, _, body) = server.get("/images/page.jp2/info").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["id"], "page.jp2");
}

#[tokio::test]
async fn test_info_nested_identifier() {
    let server = TestServer::new(16).await;
    server.add_image("scans/vol1/p1.jp2", &create_jp2(500, 400, 3, &[]));

    let (status, _, body) = server.get("/images/scans%2Fvol1%2Fp1/info").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["width"], 500);
}

#[tokio::test]
async fn test_info_missing_image_is_404() {
    let server = TestServer::new(16).await;

    let (status, _, body) = server.get("/images/nothing/info").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    let body = json(&body);
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn test_info_rejects_non_jp2() {
    let server = TestServer::new(16).await;
    server.add_image("photo.jp2", &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F', 0, 1]);

    let (status, _, body) = server.get("/images/photo/info").await;

    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(json(&body)["error"], "unsupported_format");
}

#[tokio::test]
async fn test_traversal_identifier_is_404() {
    let server = server_with_page().await;
    std::fs::write(server.dir.path().join("secret.jp2"), create_jp2(10, 10, 0, &[])).unwrap();

    let (status, _, _) = server.get("/images/..%2Fsecret/info").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = server.get("/images/%2Fetc%2Fpasswd/info").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// XML
// =============================================================================

#[tokio::test]
async fn test_xml_lists_boxes_in_order() {
    let server = TestServer::new(16).await;
    server.add_image(
        "doc.jp2",
        &create_jp2(100, 100, 2, &["<a/>", "<b>second</b>"]),
    );

    let (status, _, body) = server.get("/images/doc/xml").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body), serde_json::json!(["<a/>", "<b>second</b>"]));
}

#[tokio::test]
async fn test_xml_empty_when_no_boxes() {
    let server = TestServer::new(16).await;
    server.add_image("bare.jp2", &create_jp2(100, 100, 2, &[]));

    let (status, _, body) = server.get("/images/bare/xml").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body), serde_json::json!([]));
}

// =============================================================================
// Region
// =============================================================================

#[tokio::test]
async fn test_region_returns_jpeg_with_headers() {
    let server = server_with_page().await;

    let (status, headers, body) = server
        .get("/images/page/region?region=0,0,0.5,0.5&level=2")
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "image/jpeg");
    assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=600");
    assert_eq!(headers["x-tile-cache-hit"], "false");
    assert!(is_valid_jpeg(&body));

    let params = server.engine.last_params().unwrap();
    assert_eq!(params.reduce, 3);
    assert_eq!(params.region, Some([0.0, 0.0, 0.5, 0.5]));
}

#[tokio::test]
async fn test_region_second_request_is_cache_hit() {
    let server = server_with_page().await;
    let uri = "/images/page/region?region=0,0,128,128&reduce=2";

    let (_, first_headers, first) = server.get(uri).await;
    let (status, headers, second) = server.get(uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(first_headers["x-tile-cache-hit"], "false");
    assert_eq!(headers["x-tile-cache-hit"], "true");
    assert_eq!(first, second);
    assert_eq!(server.engine.decode_count(), 1);
    assert_eq!(server.tile_files(), 1);
}

#[tokio::test]
async fn test_region_pixel_coordinates_scale_with_reduce() {
    let server = server_with_page().await;

    let (status, _, _) = server
        .get("/images/page/region?region=100,200,250,500&reduce=2")
        .await;

    assert_eq!(status, StatusCode::OK);
    let [top, left, height, width] = server.engine.last_params().unwrap().region.unwrap();
    assert!((top - 0.1).abs() < 1e-9);
    assert!((left - 0.1).abs() < 1e-9);
    assert!((height - 1.0).abs() < 1e-9);
    assert!((width - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_region_rotation_and_layer_forwarded() {
    let server = server_with_page().await;

    let (status, _, _) = server
        .get("/images/page/region?rotate=90&layer=1&reduce=4")
        .await;

    assert_eq!(status, StatusCode::OK);
    let params = server.engine.last_params().unwrap();
    assert_eq!(params.rotation.degrees(), 90);
    assert_eq!(params.layer, 1);
    assert_eq!(params.reduce, 4);
    assert_eq!(params.region, None);
}

#[tokio::test]
async fn test_region_quality_changes_cache_entry() {
    let server = server_with_page().await;

    server.get("/images/page/region?reduce=4&quality=50").await;
    let (_, headers, _) = server.get("/images/page/region?reduce=4&quality=90").await;

    assert_eq!(headers["x-tile-cache-hit"], "false");
    assert_eq!(server.engine.decode_count(), 2);
}

#[tokio::test]
async fn test_region_invalid_parameters_are_400() {
    let server = server_with_page().await;

    for uri in [
        "/images/page/region?region=0,0,10",
        "/images/page/region?region=a,b,c,d",
        "/images/page/region?region=0,0,1.5,0.5",
        "/images/page/region?rotate=45",
        "/images/page/region?level=x",
        "/images/page/region?fit=0,100",
    ] {
        let (status, _, body) = server.get(uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(json(&body)["error"], "invalid_request", "{}", uri);
    }

    assert_eq!(server.engine.decode_count(), 0);
}

#[tokio::test]
async fn test_region_bad_quality_is_400() {
    let server = server_with_page().await;

    for uri in [
        "/images/page/region?quality=0",
        "/images/page/region?quality=101",
        "/images/page/region?quality=high",
    ] {
        let (status, _, _) = server.get(uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
    }

    assert_eq!(server.engine.decode_count(), 0);
}

#[tokio::test]
async fn test_region_missing_image_is_404() {
    let server = TestServer::new(16).await;

    let (status, _, _) = server.get("/images/ghost/region?reduce=1").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_counts_cached_tiles() {
    let server = server_with_page().await;

    server.get("/images/page/region?reduce=4").await;
    server.get("/images/page/region?reduce=3").await;
    let (_, _, body) = server.get("/health").await;

    assert_eq!(json(&body)["cached_tiles"], 2);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let server = TestServer::new(16).await;

    let (status, _, _) = server.get("/tiles/page/0/0_0.jpg").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
