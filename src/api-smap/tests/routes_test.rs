//! Integration tests for the sitemap routes, over the in-memory stores.
//!
//! - GET /sitemap.xml - default variant
//! - GET /{variant}/sitemap.xml - any variant
//! - ?page=N - one chunk
//! - GET /health

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use tower::ServiceExt;

use api_smap::{AppState, router};
use core_smap::store::ChunkStore;
use core_smap::test_helpers::name;
use core_smap::{MemoryStore, Settings, Stores};

async fn published_store(variant: &str, chunks: &[(i32, &str)]) -> MemoryStore {
    let store = MemoryStore::new();
    for (delta, content) in chunks {
        store.stage(&name(variant), *delta, content).await.unwrap();
    }
    store.publish(&name(variant)).await.unwrap();
    store
}

fn app(store: &MemoryStore) -> axum::Router {
    router().with_state(AppState::from_stores(&Stores::from_store(store.clone())))
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, Option<String>, String) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, content_type, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn test_health() {
    let (status, _, body) = get(app(&MemoryStore::new()), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "healthy");
}

#[tokio::test]
async fn test_default_sitemap_serves_index_then_pages() {
    let store = published_store("default", &[(0, "<index/>"), (1, "<one/>"), (2, "<two/>")]).await;

    let (status, content_type, body) = get(app(&store), "/sitemap.xml").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/xml; charset=utf-8"));
    assert_eq!(body, "<index/>");

    let (status, _, body) = get(app(&store), "/sitemap.xml?page=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "<two/>");

    let (status, _, _) = get(app(&store), "/sitemap.xml?page=3").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = get(app(&store), "/sitemap.xml?page=0").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_single_chunk_is_served_without_index() {
    let store = published_store("news", &[(1, "<only/>")]).await;

    let (status, _, body) = get(app(&store), "/news/sitemap.xml").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "<only/>");
}

#[tokio::test]
async fn test_unpublished_and_invalid_variants_are_not_found() {
    let store = published_store("news", &[(1, "<only/>")]).await;

    let (status, _, _) = get(app(&store), "/sitemap.xml").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = get(app(&store), "/blog/sitemap.xml").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = get(app(&store), "/not%20valid/sitemap.xml").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_staged_chunks_are_not_served() {
    let store = published_store("default", &[(1, "<old/>")]).await;
    store.stage(&name("default"), 1, "<new/>").await.unwrap();

    let (_, _, body) = get(app(&store), "/sitemap.xml").await;
    assert_eq!(body, "<old/>");
}

#[tokio::test]
async fn test_default_variant_follows_settings() {
    let store = published_store("news", &[(1, "<news/>")]).await;
    let settings = Settings {
        default_variant: Some(name("news")),
        ..Settings::default()
    };
    Stores::from_store(store.clone()).settings.save(&settings).await.unwrap();

    let (status, _, body) = get(app(&store), "/sitemap.xml").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "<news/>");
}

#[tokio::test]
async fn test_robots_header() {
    let store = published_store("default", &[(1, "<one/>")]).await;
    let request = Request::builder().uri("/sitemap.xml").body(Body::empty()).unwrap();
    let response = app(&store).oneshot(request).await.unwrap();
    assert_eq!(response.headers().get("x-robots-tag").unwrap(), "noindex, follow");
}
