//! Configuration types for comicshelf

use crate::error::{Error, Result};
use crate::types::OutputFormat;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use utoipa::ToSchema;

/// Cache and workspace locations
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CacheConfig {
    /// Root of the on-disk cache (default: "./cache")
    ///
    /// Pages land in `{cache_root}/pages/{comic_id}/{page}.{ext}` and
    /// thumbnails in `{cache_root}/thumbnails/{comic_id}.{ext}`.
    #[serde(default = "default_cache_root")]
    pub cache_root: PathBuf,

    /// Parent directory for per-extraction temporary workspaces
    /// (default: `{system temp}/comicshelf`)
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_root: default_cache_root(),
            temp_dir: default_temp_dir(),
        }
    }
}

/// Archive decoding behavior
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ExtractionConfig {
    /// Archives larger than this are decoded in ranged windows around the
    /// requested page instead of one page at a time (default: 100 MiB)
    #[serde(default = "default_large_file_threshold")]
    pub large_file_threshold_bytes: u64,

    /// Pages after the requested one to warm in the background (default: 5)
    #[serde(default = "default_preload_count")]
    pub preload_count: u32,

    /// Upper bound for a client-supplied preload count (default: 20)
    #[serde(default = "default_max_preload_count")]
    pub max_preload_count: u32,

    /// Maximum decode/transcode jobs running at once (default: 4)
    #[serde(default = "default_max_concurrent_extractions")]
    pub max_concurrent_extractions: usize,

    /// Archive member extensions treated as page images (without dots)
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            large_file_threshold_bytes: default_large_file_threshold(),
            preload_count: default_preload_count(),
            max_preload_count: default_max_preload_count(),
            max_concurrent_extractions: default_max_concurrent_extractions(),
            image_extensions: default_image_extensions(),
        }
    }
}

/// Thumbnail rendering
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ThumbnailConfig {
    /// Maximum thumbnail width in pixels (default: 300)
    #[serde(default = "default_thumbnail_width")]
    pub max_width: u32,

    /// Maximum thumbnail height in pixels (default: 450)
    #[serde(default = "default_thumbnail_height")]
    pub max_height: u32,

    /// Encoding used for thumbnails (default: jpeg)
    #[serde(default)]
    pub format: OutputFormat,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            max_width: default_thumbnail_width(),
            max_height: default_thumbnail_height(),
            format: OutputFormat::Jpeg,
        }
    }
}

/// HTTP serving configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:8090)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser readers (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// `Cache-Control` value sent with page bytes. Page artifacts never
    /// change for a given key, so the default marks them immutable.
    #[serde(default = "default_cache_control")]
    pub cache_control: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            cache_control: default_cache_control(),
        }
    }
}

/// Main configuration for the page engine
///
/// Fields are organized into logical sub-configs:
/// - [`cache`](CacheConfig) — cache root, temp workspace parent
/// - [`extraction`](ExtractionConfig) — size tiering, preload, concurrency
/// - [`thumbnails`](ThumbnailConfig) — thumbnail box and format
/// - [`server`](ServerConfig) — HTTP binding and headers
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Cache and workspace locations
    #[serde(default)]
    pub cache: CacheConfig,

    /// Archive decoding behavior
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Thumbnail rendering
    #[serde(default)]
    pub thumbnails: ThumbnailConfig,

    /// HTTP serving
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Cache root directory
    pub fn cache_root(&self) -> &PathBuf {
        &self.cache.cache_root
    }

    /// Temporary workspace parent directory
    pub fn temp_dir(&self) -> &PathBuf {
        &self.cache.temp_dir
    }

    /// Load a JSON configuration file; missing fields take their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read config file {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("failed to parse config file {}: {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.extraction.max_concurrent_extractions == 0 {
            return Err(Error::Config {
                message: "max_concurrent_extractions must be at least 1".to_string(),
                key: Some("max_concurrent_extractions".to_string()),
            });
        }
        if self.extraction.preload_count > self.extraction.max_preload_count {
            return Err(Error::Config {
                message: format!(
                    "preload_count {} exceeds max_preload_count {}",
                    self.extraction.preload_count, self.extraction.max_preload_count
                ),
                key: Some("preload_count".to_string()),
            });
        }
        if self.thumbnails.max_width == 0 || self.thumbnails.max_height == 0 {
            return Err(Error::Config {
                message: "thumbnail dimensions must be non-zero".to_string(),
                key: Some("thumbnails".to_string()),
            });
        }
        if self.extraction.image_extensions.is_empty() {
            return Err(Error::Config {
                message: "at least one image extension is required".to_string(),
                key: Some("image_extensions".to_string()),
            });
        }
        if axum::http::HeaderValue::from_str(&self.server.cache_control).is_err() {
            return Err(Error::Config {
                message: format!(
                    "cache_control {:?} is not a valid header value",
                    self.server.cache_control
                ),
                key: Some("cache_control".to_string()),
            });
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_root() -> PathBuf {
    PathBuf::from("./cache")
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("comicshelf")
}

fn default_large_file_threshold() -> u64 {
    100 * 1024 * 1024
}

fn default_preload_count() -> u32 {
    5
}

fn default_max_preload_count() -> u32 {
    20
}

fn default_max_concurrent_extractions() -> usize {
    4
}

fn default_image_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "gif", "webp", "bmp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_thumbnail_width() -> u32 {
    300
}

fn default_thumbnail_height() -> u32 {
    450
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8090))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_cache_control() -> String {
    "public, max-age=31536000, immutable".to_string()
}
