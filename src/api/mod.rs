//! REST API server module
//!
//! Serves page bytes, thumbnails and cache administration over HTTP, with
//! an OpenAPI 3.1 description of every route.

use crate::service::PageService;
use crate::{Config, Result};
use axum::{
    Router,
    http::HeaderValue,
    routing::{delete, get},
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Pages
/// - `GET /comics/:id/pages/:page` - Page bytes in the format negotiated
///   from `Accept` (`?preload=N` overrides the preload count)
/// - `GET /comics/:id/thumbnail` - Cover thumbnail
/// - `GET /comics/:id/page-count` - Number of pages in the archive
///
/// ## Cache
/// - `DELETE /comics/:id/cache` - Remove a comic's cached pages and thumbnail
/// - `GET /cache/usage` - Files and bytes under the cache root
///
/// ## System
/// - `GET /stats` - Request counters
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
pub fn create_router(service: PageService, config: Arc<Config>) -> Router {
    let state = AppState::new(service, config.clone());

    let router = Router::new()
        // Pages
        .route("/comics/:id/pages/:page", get(routes::get_page))
        .route("/comics/:id/thumbnail", get(routes::get_thumbnail))
        .route("/comics/:id/page-count", get(routes::get_page_count))
        // Cache
        .route("/comics/:id/cache", delete(routes::purge_comic_cache))
        .route("/cache/usage", get(routes::cache_usage))
        // System
        .route("/stats", get(routes::service_stats))
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    // Apply CORS middleware if enabled in config
    if config.server.cors_enabled {
        let cors = build_cors_layer(&config.server.cors_origins);
        router.layer(cors)
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` (or an empty list) allows any origin; otherwise only the listed
/// origins are allowed. All methods and headers are permitted.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address
///
/// Serves until `shutdown` resolves, then stops accepting connections and
/// lets in-flight requests finish.
///
/// # Example
///
/// ```no_run
/// use comicshelf::catalog::{ComicCatalog, MemoryCatalog};
/// use comicshelf::{Config, PageService};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let catalog: Arc<dyn ComicCatalog> = Arc::new(MemoryCatalog::new());
/// let service = PageService::new((*config).clone(), catalog.clone()).await?;
///
/// comicshelf::api::start_api_server(service, config, std::future::pending()).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server<F>(
    service: PageService,
    config: Arc<Config>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let bind_address = config.server.bind_address;

    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(service, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(
        address = %listener.local_addr().unwrap_or(bind_address),
        "API server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
