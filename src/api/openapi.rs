//! OpenAPI documentation and schema generation
//!
//! This module defines the OpenAPI specification for the comicshelf REST API
//! using utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the comicshelf REST API
///
/// The document is served as JSON from `/api/v1/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "comicshelf REST API",
        version = "0.1.0",
        description = "OpenAPI 3.1 compliant REST API for streaming comic pages, thumbnails and managing the page cache",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:8090/api/v1", description = "Local development server")
    ),
    paths(
        // Pages
        crate::api::routes::get_page,
        crate::api::routes::get_thumbnail,
        crate::api::routes::get_page_count,

        // Cache
        crate::api::routes::purge_comic_cache,
        crate::api::routes::cache_usage,

        // System
        crate::api::routes::service_stats,
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::ComicId,
        crate::types::OutputFormat,
        crate::types::CacheKey,
        crate::types::ArchiveType,
        crate::types::ContentHash,

        // Config types from config.rs
        crate::config::Config,
        crate::config::CacheConfig,
        crate::config::ExtractionConfig,
        crate::config::ThumbnailConfig,
        crate::config::ServerConfig,

        // Service and cache reports
        crate::service::ServiceStats,
        crate::cache::CacheUsage,

        // API request/response types from routes
        crate::api::routes::PageQuery,
        crate::api::routes::PageCountResponse,
        crate::api::routes::PurgeResponse,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "pages", description = "Pages - Stream page images and thumbnails in a negotiated format"),
        (name = "cache", description = "Cache - Purge cached pages and inspect disk usage"),
        (name = "system", description = "System endpoints - Health checks, counters, OpenAPI spec"),
    )
)]
pub struct ApiDoc;
