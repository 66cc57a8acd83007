//! Core types shared across the extraction, cache and serving layers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use utoipa::ToSchema;

/// Unique identifier for a comic in the catalog
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct ComicId(pub i64);

impl ComicId {
    /// Create a new ComicId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for ComicId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<ComicId> for i64 {
    fn from(id: ComicId) -> Self {
        id.0
    }
}

impl fmt::Display for ComicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Image format served to clients and stored in the page cache
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JPEG, the universal fallback
    #[default]
    Jpeg,
    /// PNG
    Png,
    /// WebP
    Webp,
}

impl OutputFormat {
    /// All output formats, in negotiation priority order
    pub const ALL: [OutputFormat; 3] = [OutputFormat::Webp, OutputFormat::Png, OutputFormat::Jpeg];

    /// File extension used for cache entries
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Webp => "webp",
        }
    }

    /// MIME type sent as `Content-Type`
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Webp => "image/webp",
        }
    }

    /// Map a file extension (case-insensitive, without the dot) to a format
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(OutputFormat::Jpeg),
            "png" => Some(OutputFormat::Png),
            "webp" => Some(OutputFormat::Webp),
            _ => None,
        }
    }

    /// Map a decoded `image` crate format to an output format, if it is one
    pub fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(OutputFormat::Jpeg),
            image::ImageFormat::Png => Some(OutputFormat::Png),
            image::ImageFormat::WebP => Some(OutputFormat::Webp),
            _ => None,
        }
    }

    /// The `image` crate encoder format
    pub fn image_format(&self) -> image::ImageFormat {
        match self {
            OutputFormat::Jpeg => image::ImageFormat::Jpeg,
            OutputFormat::Png => image::ImageFormat::Png,
            OutputFormat::Webp => image::ImageFormat::WebP,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Identifies one cached page artifact: (comic, 1-based page, output format)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct CacheKey {
    /// Comic the page belongs to
    pub comic_id: ComicId,
    /// 1-based page number after natural-sort ordering
    pub page: u32,
    /// Output format of the cached artifact
    pub format: OutputFormat,
}

impl CacheKey {
    /// Create a new cache key
    pub fn new(comic_id: ComicId, page: u32, format: OutputFormat) -> Self {
        Self {
            comic_id,
            page,
            format,
        }
    }

    /// Same comic and format, different page
    pub fn with_page(&self, page: u32) -> Self {
        Self { page, ..*self }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}.{}", self.comic_id, self.page, self.format)
    }
}

/// A page artifact that exists in the on-disk cache
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedPage {
    /// Key the artifact was stored under
    pub key: CacheKey,
    /// Absolute location of the cached file
    pub path: PathBuf,
    /// Size of the cached file in bytes
    pub size_bytes: u64,
}

/// Read-only reference to a comic archive on disk
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveHandle {
    /// Location of the archive
    pub path: PathBuf,
    /// Size of the archive file in bytes
    pub size_bytes: u64,
    /// Page count declared by the catalog, if any
    pub declared_page_count: Option<u32>,
}

/// Comic file information resolved by the catalog
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComicFile {
    /// Location of the archive
    pub path: PathBuf,
    /// Page count declared by the catalog (`None` when not yet known)
    pub declared_page_count: Option<u32>,
}

/// Container format of a comic archive
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveType {
    /// ZIP family (.cbz, .zip)
    Zip,
    /// RAR family (.cbr, .rar)
    Rar,
    /// 7-Zip family (.cb7, .7z)
    SevenZip,
    /// TAR family (.cbt, .tar)
    Tar,
}

impl ArchiveType {
    /// Human-readable name used in log lines
    pub fn name(&self) -> &'static str {
        match self {
            ArchiveType::Zip => "ZIP",
            ArchiveType::Rar => "RAR",
            ArchiveType::SevenZip => "7z",
            ArchiveType::Tar => "TAR",
        }
    }
}

/// Inclusive, 1-based range of page positions
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRange {
    /// First page (1-based, inclusive)
    pub start: u32,
    /// Last page (1-based, inclusive)
    pub end: u32,
}

impl PageRange {
    /// Create a range; `end` is raised to `start` if it is smaller
    pub fn new(start: u32, end: u32) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// A range covering exactly one page
    pub fn single(page: u32) -> Self {
        Self::new(page, page)
    }

    /// Whether the 1-based `page` falls within the range
    pub fn contains(&self, page: u32) -> bool {
        page >= self.start && page <= self.end
    }

    /// Number of pages covered
    pub fn len(&self) -> u32 {
        self.end - self.start + 1
    }

    /// Ranges always cover at least one page
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Clip the end of the range to `page_count`; `None` if nothing remains
    pub fn clip(&self, page_count: u32) -> Option<Self> {
        if self.start > page_count {
            None
        } else {
            Some(Self::new(self.start, self.end.min(page_count)))
        }
    }
}

/// An image member extracted from an archive
#[derive(Clone, Debug)]
pub struct RawImage {
    /// 1-based page position after natural sort
    pub page: u32,
    /// Member name inside the archive
    pub name: String,
    /// Undecoded image bytes as stored in the archive
    pub bytes: Vec<u8>,
}

/// Result of decoding (part of) an archive
#[derive(Clone, Debug)]
pub struct DecodedArchive {
    /// Total number of image pages in the archive
    pub page_count: u32,
    /// Extracted images in page order. Always contains the requested
    /// range; may contain more.
    pub images: Vec<RawImage>,
}

/// SHA-256 digest of an archive's bytes, hex encoded
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Build from raw digest bytes
    pub fn from_digest(digest: &[u8]) -> Self {
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            hex.push_str(&format!("{:02x}", byte));
        }
        Self(hex)
    }

    /// Hex representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentHash {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(Self(s.to_ascii_lowercase()))
        } else {
            Err(crate::Error::Other(format!("invalid content hash: {}", s)))
        }
    }
}

/// Page bytes ready to be written to a client
#[derive(Clone, Debug)]
pub struct PageResponse {
    /// Encoded image bytes
    pub bytes: bytes::Bytes,
    /// Negotiated output format
    pub format: OutputFormat,
    /// `Cache-Control` header value
    pub cache_control: String,
    /// Whether the bytes came from the cache without decoding
    pub from_cache: bool,
}

impl PageResponse {
    /// MIME type matching the negotiated format
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}
