//! Error types for comicshelf
//!
//! This module provides error handling for the page engine, including:
//! - Domain-specific error types (extraction, transcoding)
//! - HTTP status code mapping for the serving layer
//! - Structured error responses with machine-readable error codes

use crate::types::ComicId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for comicshelf operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for comicshelf
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "cache_root")
        key: Option<String>,
    },

    /// Catalog database error
    #[error("database error: {0}")]
    Database(String),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Archive could not be decoded
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Page image could not be converted to the target format
    #[error("transcode error: {0}")]
    Transcode(#[from] TranscodeError),

    /// Requested page is outside the archive's real or declared bounds
    #[error("invalid page {page} for comic {comic_id}{}", page_count.map(|c| format!(" (page count {})", c)).unwrap_or_default())]
    InvalidPage {
        /// Comic the page was requested for
        comic_id: ComicId,
        /// The requested page number
        page: u32,
        /// Known page count, if any
        page_count: Option<u32>,
    },

    /// Comic is unknown to the catalog or its file is missing from disk
    #[error("comic {comic_id} not found: {reason}")]
    ComicNotFound {
        /// The comic that could not be resolved
        comic_id: ComicId,
        /// Why it could not be resolved
        reason: String,
    },

    /// A cache entry could not be written
    #[error("failed to write cache entry {path}: {reason}")]
    DiskWriteFailure {
        /// Target path of the cache entry
        path: PathBuf,
        /// The underlying failure
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error produced by a concurrent request for the same page and shared
    /// with every request that waited on it
    #[error("{0}")]
    Shared(Arc<Error>),

    /// Shutdown in progress - not accepting new work
    #[error("shutdown in progress: not accepting new page requests")]
    ShuttingDown,

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// The error after unwrapping any [`Error::Shared`] layers
    pub fn root(&self) -> &Error {
        match self {
            Error::Shared(inner) => inner.root(),
            other => other,
        }
    }
}

/// Archive decoding errors
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Archive container format is not one of ZIP, RAR, 7z or TAR
    #[error("unsupported archive format for {archive}")]
    UnsupportedFormat {
        /// The archive that could not be identified
        archive: PathBuf,
    },

    /// The decoder rejected the archive (bad header, truncated data, ...)
    #[error("corrupt archive {archive}: {reason}")]
    CorruptArchive {
        /// The archive that failed to decode
        archive: PathBuf,
        /// The decoder's failure message
        reason: String,
    },

    /// The archive decoded but contains no recognized page images
    #[error("no images found in archive {archive}")]
    NoImagesFound {
        /// The archive without page images
        archive: PathBuf,
    },
}

/// Image transcoding errors
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// Source image format is unknown or has no decoder compiled in
    #[error("unsupported source image format for {name}")]
    UnsupportedSourceFormat {
        /// Archive member name of the image
        name: String,
    },

    /// Source image bytes could not be decoded or re-encoded
    #[error("corrupt image data in {name}: {reason}")]
    CorruptImageData {
        /// Archive member name of the image
        name: String,
        /// The codec's failure message
        reason: String,
    },
}

/// API error response format
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "invalid_page",
///     "message": "invalid page 0 for comic 7 (page count 40)",
///     "details": { "comic_id": 7, "page": 0, "page_count": 40 }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "comic_not_found")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 400,
            Error::InvalidPage { .. } => 400,

            Error::ComicNotFound { .. } => 404,

            // 415 - the archive is in a container format we cannot read
            Error::Extraction(ExtractionError::UnsupportedFormat { .. }) => 415,

            // 422 - input is supposedly valid but could not be processed
            Error::Extraction(_) => 422,
            Error::Transcode(_) => 422,

            Error::Database(_) => 500,
            Error::Sqlx(_) => 500,
            Error::Io(_) => 500,
            Error::DiskWriteFailure { .. } => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,

            Error::ShuttingDown => 503,

            Error::Shared(inner) => inner.status_code(),
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(_) => "database_error",
            Error::Sqlx(_) => "database_error",
            Error::Extraction(e) => match e {
                ExtractionError::UnsupportedFormat { .. } => "unsupported_format",
                ExtractionError::CorruptArchive { .. } => "corrupt_archive",
                ExtractionError::NoImagesFound { .. } => "no_images_found",
            },
            Error::Transcode(e) => match e {
                TranscodeError::UnsupportedSourceFormat { .. } => "unsupported_source_format",
                TranscodeError::CorruptImageData { .. } => "corrupt_image_data",
            },
            Error::InvalidPage { .. } => "invalid_page",
            Error::ComicNotFound { .. } => "comic_not_found",
            Error::DiskWriteFailure { .. } => "disk_write_failure",
            Error::Io(_) => "io_error",
            Error::Shared(inner) => inner.error_code(),
            Error::ShuttingDown => "shutting_down",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match error.root() {
            Error::InvalidPage {
                comic_id,
                page,
                page_count,
            } => Some(serde_json::json!({
                "comic_id": comic_id,
                "page": page,
                "page_count": page_count,
            })),
            Error::ComicNotFound { comic_id, .. } => Some(serde_json::json!({
                "comic_id": comic_id,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
