//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`pages`] — Page, thumbnail and page-count streaming
//! - [`cache`] — Cache purge and usage
//! - [`system`] — Health, stats, OpenAPI

use serde::{Deserialize, Serialize};

mod cache;
mod pages;
mod system;

// Re-export all handlers so `routes::function_name` works
pub use cache::*;
pub use pages::*;
pub use system::*;

// ============================================================================
// Query/Request/Response Types (shared across handlers)
// ============================================================================

/// Query parameters for GET /comics/:id/pages/:page
#[derive(Debug, Default, Deserialize, Serialize, utoipa::ToSchema, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// Pages after this one to warm in the background (default from
    /// config, capped at `max_preload_count`)
    pub preload: Option<u32>,
}

/// Response for GET /comics/:id/page-count
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct PageCountResponse {
    /// Comic the count belongs to
    pub comic_id: crate::types::ComicId,
    /// Number of page images in the archive
    pub page_count: u32,
}

/// Response for DELETE /comics/:id/cache
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct PurgeResponse {
    /// Comic whose cache entries were removed
    pub comic_id: crate::types::ComicId,
    /// Number of files removed
    pub removed: u64,
}
