//! Cache administration handlers.

use super::PurgeResponse;
use crate::api::AppState;
use crate::types::ComicId;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// DELETE /comics/:id/cache - Remove a comic's cached pages and thumbnail
#[utoipa::path(
    delete,
    path = "/api/v1/comics/{id}/cache",
    tag = "cache",
    params(
        ("id" = i64, Path, description = "Comic ID")
    ),
    responses(
        (status = 200, description = "Cache entries removed", body = PurgeResponse),
        (status = 500, description = "Internal server error", body = crate::error::ApiError)
    )
)]
pub async fn purge_comic_cache(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let comic_id = ComicId(id);
    match state.service.purge_comic(comic_id).await {
        Ok(removed) => (StatusCode::OK, Json(PurgeResponse { comic_id, removed })).into_response(),
        Err(e) => {
            tracing::error!(comic_id = id, error = %e, "Failed to purge comic cache");
            e.into_response()
        }
    }
}

/// GET /cache/usage - Files and bytes under the cache root
#[utoipa::path(
    get,
    path = "/api/v1/cache/usage",
    tag = "cache",
    responses(
        (status = 200, description = "Cache usage totals", body = crate::cache::CacheUsage),
        (status = 500, description = "Internal server error", body = crate::error::ApiError)
    )
)]
pub async fn cache_usage(State(state): State<AppState>) -> Response {
    match state.service.cache_usage().await {
        Ok(usage) => (StatusCode::OK, Json(usage)).into_response(),
        Err(e) => e.into_response(),
    }
}
