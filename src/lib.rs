//! # comicshelf
//!
//! Page extraction, format negotiation and caching engine for comic book
//! archives (CBZ, CBR, CB7, CBT).
//!
//! ## Design Philosophy
//!
//! comicshelf is designed to be:
//! - **Cache-first** - A cached page is served without opening the archive
//! - **Single-flight** - Concurrent requests for one page share one decode
//! - **Size-aware** - Large archives are decoded as a window of pages in one
//!   pass, small ones page by page with background preload
//! - **Library-first** - The HTTP layer is optional; [`PageService`] is the
//!   whole engine
//!
//! ## Quick Start
//!
//! ```no_run
//! use comicshelf::{ComicId, Config, ExtractionRequest, MemoryCatalog, PageService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = Arc::new(MemoryCatalog::new());
//!     catalog.insert(ComicId(7), "/library/saga-01.cbz", Some(40)).await;
//!
//!     let service = PageService::new(Config::default(), catalog).await?;
//!
//!     let request = ExtractionRequest::new(ComicId(7), 1, Some("image/webp,image/*"));
//!     let page = service.get_page(request).await?;
//!     println!("{} bytes of {}", page.bytes.len(), page.content_type());
//!
//!     service.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API server
pub mod api;
/// On-disk page and thumbnail cache
pub mod cache;
/// Comic lookup (id to archive path)
pub mod catalog;
/// Configuration types
pub mod config;
/// Content-hash duplicate detection
pub mod duplicates;
/// Error types
pub mod error;
/// Archive decoding (ZIP, RAR, 7z, TAR)
pub mod extraction;
/// `Accept` header negotiation
pub mod negotiate;
/// Request orchestration: cache, single-flight, size tiering, preload
pub mod service;
/// Image re-encoding and thumbnails
pub mod transcode;
/// Core types
pub mod types;

// Re-export commonly used types
pub use cache::{CacheUsage, PageCache};
pub use catalog::{ComicCatalog, MemoryCatalog, SqliteCatalog};
pub use config::{CacheConfig, Config, ExtractionConfig, ServerConfig, ThumbnailConfig};
pub use duplicates::{DuplicateDetector, DuplicateReport};
pub use error::{
    ApiError, Error, ErrorDetail, ExtractionError, Result, ToHttpStatus, TranscodeError,
};
pub use extraction::{ArchiveDecoder, DecoderRegistry};
pub use negotiate::choose_format;
pub use service::{ExtractionRequest, PageService, ServiceStats};
pub use transcode::ImageTranscoder;
pub use types::{
    ArchiveHandle, ArchiveType, CacheKey, ComicFile, ComicId, ContentHash, OutputFormat,
    PageRange, PageResponse,
};

/// Wait for a termination signal, then shut the service down gracefully
///
/// Listens for SIGTERM and SIGINT (Ctrl+C) on unix, Ctrl+C elsewhere.
/// In-flight extractions and preloads are allowed to finish before this
/// returns.
///
/// # Example
///
/// ```no_run
/// use comicshelf::{Config, MemoryCatalog, PageService, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let service = PageService::new(Config::default(), Arc::new(MemoryCatalog::new())).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(service).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(service: PageService) -> Result<()> {
    wait_for_signal().await;
    service.shutdown().await
}

/// Resolve when the process receives a termination signal
#[cfg(unix)]
pub async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration can fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

/// Resolve when the process receives Ctrl+C
#[cfg(not(unix))]
pub async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
