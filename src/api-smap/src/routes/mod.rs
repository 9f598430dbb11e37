use std::sync::Arc;

use axum::{Router, http::StatusCode, middleware, routing::get};
use tower_http::trace::TraceLayer;

use core_smap::Stores;
use core_smap::store::{ChunkStore, SettingsStore};

pub mod logging_middleware;
pub mod sitemap;

/// What the handlers read: published chunks, and settings to know the default variant.
#[derive(Clone)]
pub struct AppState {
    pub chunks: Arc<dyn ChunkStore>,
    pub settings: Arc<dyn SettingsStore>,
}

impl AppState {
    pub fn from_stores(stores: &Stores) -> Self {
        AppState {
            chunks: stores.chunks.clone(),
            settings: stores.settings.clone(),
        }
    }
}

pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "healthy")
}

//
// Router
//

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/sitemap.xml", get(sitemap::get_default_sitemap))
        .route("/{variant}/sitemap.xml", get(sitemap::get_variant_sitemap))
        // Custom route access logging
        .layer(middleware::from_fn(logging_middleware::log_route_access))
        // Tracing middleware
        .layer(TraceLayer::new_for_http())
}
