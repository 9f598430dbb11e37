use axum::{
    extract::{Path, Query, State},
    http::{HeaderName, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use core_smap::{SitemapChunk, VariantName};

use crate::routes::AppState;

const X_ROBOTS_TAG: HeaderName = HeaderName::from_static("x-robots-tag");

#[derive(Debug, Clone, Deserialize)]
pub struct SitemapQuery {
    /// Chunk number, from 1.
    pub page: Option<i32>,
}

#[derive(Debug)]
pub enum GetSitemapError {
    /// No such variant, or nothing published for it (yet).
    NotFound,
    Unknown(String),
}

impl IntoResponse for GetSitemapError {
    fn into_response(self) -> Response {
        match self {
            GetSitemapError::NotFound => (StatusCode::NOT_FOUND, "Sitemap not found").into_response(),
            GetSitemapError::Unknown(e) => {
                tracing::error!("Failed to read sitemap: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read sitemap").into_response()
            }
        }
    }
}

impl From<core_smap::Error> for GetSitemapError {
    fn from(e: core_smap::Error) -> Self {
        GetSitemapError::Unknown(e.to_string())
    }
}

/// GET /sitemap.xml - the default variant's sitemap
pub async fn get_default_sitemap(
    State(state): State<AppState>,
    Query(query): Query<SitemapQuery>,
) -> Result<Response, GetSitemapError> {
    let settings = state.settings.load().await?.unwrap_or_default();
    let variant = settings.default_variant.ok_or(GetSitemapError::NotFound)?;
    serve(&state, &variant, query.page).await
}

/// GET /{variant}/sitemap.xml
pub async fn get_variant_sitemap(
    State(state): State<AppState>,
    Path(variant): Path<String>,
    Query(query): Query<SitemapQuery>,
) -> Result<Response, GetSitemapError> {
    let variant = VariantName::new(variant).map_err(|_| GetSitemapError::NotFound)?;
    serve(&state, &variant, query.page).await
}

/// Without a page the index is served, or the only chunk when there is no index.
async fn serve(state: &AppState, variant: &VariantName, page: Option<i32>) -> Result<Response, GetSitemapError> {
    let chunk: Option<SitemapChunk> = match page {
        Some(page) if page >= 1 => state.chunks.published_chunk(variant, page).await?,
        Some(_) => None,
        None => match state.chunks.published_chunk(variant, 0).await? {
            Some(index) => Some(index),
            None => state.chunks.published_chunk(variant, 1).await?,
        },
    };
    let chunk = chunk.ok_or(GetSitemapError::NotFound)?;
    tracing::debug!("Serving chunk {} of variant {}", chunk.delta, variant);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/xml; charset=utf-8"),
            (X_ROBOTS_TAG, "noindex, follow"),
        ],
        chunk.content,
    )
        .into_response())
}
