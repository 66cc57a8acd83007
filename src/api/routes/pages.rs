//! Page and thumbnail streaming handlers.

use super::{PageCountResponse, PageQuery};
use crate::api::AppState;
use crate::error::ApiError;
use crate::service::ExtractionRequest;
use crate::types::{ComicId, PageResponse};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

/// Header reporting whether the bytes came from the page cache
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// GET /comics/:id/pages/:page - Stream one page
#[utoipa::path(
    get,
    path = "/api/v1/comics/{id}/pages/{page}",
    tag = "pages",
    params(
        ("id" = i64, Path, description = "Comic ID"),
        ("page" = u32, Path, description = "1-based page number"),
        PageQuery
    ),
    responses(
        (status = 200, description = "Page image (image/webp, image/png or image/jpeg)", content_type = "image/*"),
        (status = 400, description = "Page number out of range", body = crate::error::ApiError),
        (status = 404, description = "Comic not found", body = crate::error::ApiError),
        (status = 415, description = "Unsupported archive format", body = crate::error::ApiError),
        (status = 422, description = "Archive or image could not be decoded", body = crate::error::ApiError),
        (status = 503, description = "Shutting down", body = crate::error::ApiError)
    )
)]
pub async fn get_page(
    State(state): State<AppState>,
    Path((id, page)): Path<(i64, u32)>,
    Query(query): Query<PageQuery>,
    headers: HeaderMap,
) -> Response {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok());

    let mut request = ExtractionRequest::new(ComicId(id), page, accept);
    if let Some(preload) = query.preload {
        request = request.with_preload(preload);
    }

    match state.service.get_page(request).await {
        Ok(page) => image_response(page),
        Err(e) => {
            tracing::debug!(comic_id = id, page, error = %e, "page request failed");
            e.into_response()
        }
    }
}

/// GET /comics/:id/thumbnail - Stream the cover thumbnail
#[utoipa::path(
    get,
    path = "/api/v1/comics/{id}/thumbnail",
    tag = "pages",
    params(
        ("id" = i64, Path, description = "Comic ID")
    ),
    responses(
        (status = 200, description = "Thumbnail image", content_type = "image/*"),
        (status = 404, description = "Comic not found", body = crate::error::ApiError),
        (status = 422, description = "Archive or image could not be decoded", body = crate::error::ApiError)
    )
)]
pub async fn get_thumbnail(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.service.thumbnail(ComicId(id)).await {
        Ok(thumbnail) => image_response(thumbnail),
        Err(e) => e.into_response(),
    }
}

/// GET /comics/:id/page-count - Count the pages of a comic
#[utoipa::path(
    get,
    path = "/api/v1/comics/{id}/page-count",
    tag = "pages",
    params(
        ("id" = i64, Path, description = "Comic ID")
    ),
    responses(
        (status = 200, description = "Page count", body = PageCountResponse),
        (status = 404, description = "Comic not found", body = crate::error::ApiError),
        (status = 422, description = "Archive could not be listed", body = crate::error::ApiError)
    )
)]
pub async fn get_page_count(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let comic_id = ComicId(id);
    match state.service.page_count(comic_id).await {
        Ok(page_count) => (
            StatusCode::OK,
            Json(PageCountResponse {
                comic_id,
                page_count,
            }),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Image bytes with content type, caching and negotiation headers
pub(crate) fn image_response(page: PageResponse) -> Response {
    let cache_control = match HeaderValue::from_str(&page.cache_control) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(value = ?page.cache_control, error = %e, "invalid Cache-Control value");
            return ApiError::internal("configured Cache-Control is not a valid header value")
                .into_response();
        }
    };
    let cache_status = if page.from_cache { "HIT" } else { "MISS" };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(page.content_type())),
            (header::CACHE_CONTROL, cache_control),
            (header::VARY, HeaderValue::from_static("Accept")),
            (X_CACHE, HeaderValue::from_static(cache_status)),
        ],
        page.bytes,
    )
        .into_response()
}
