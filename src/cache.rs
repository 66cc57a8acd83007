//! Disk-backed page cache
//!
//! Layout under the cache root:
//!
//! ```text
//! {root}/pages/{comic_id}/{page}.{ext}
//! {root}/thumbnails/{comic_id}.{ext}
//! ```
//!
//! Entries are written to a temporary file in the destination directory and
//! renamed into place, so readers never see a partial file. Nothing is ever
//! evicted automatically; [`PageCache::purge_comic`] is the only removal path.

use crate::error::{Error, Result};
use crate::types::{CacheKey, CachedPage, ComicId, OutputFormat};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;
use tracing::{debug, info};
use utoipa::ToSchema;

const PAGES_DIR: &str = "pages";
const THUMBNAILS_DIR: &str = "thumbnails";

/// Totals for everything stored under the cache root
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CacheUsage {
    /// Number of cached page files
    pub page_files: u64,
    /// Number of cached thumbnails
    pub thumbnail_files: u64,
    /// Total size of all cached files in bytes
    pub total_bytes: u64,
}

/// On-disk store of transcoded pages and thumbnails
#[derive(Clone, Debug)]
pub struct PageCache {
    root: PathBuf,
}

impl PageCache {
    /// Create a cache rooted at `root`; directories are created lazily
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every page of a comic
    pub fn comic_dir(&self, comic_id: ComicId) -> PathBuf {
        self.root.join(PAGES_DIR).join(comic_id.to_string())
    }

    /// Location of the artifact for `key`
    pub fn page_path(&self, key: &CacheKey) -> PathBuf {
        self.comic_dir(key.comic_id)
            .join(format!("{}.{}", key.page, key.format.extension()))
    }

    /// Location of a comic's thumbnail
    pub fn thumbnail_path(&self, comic_id: ComicId, format: OutputFormat) -> PathBuf {
        self.root
            .join(THUMBNAILS_DIR)
            .join(format!("{}.{}", comic_id, format.extension()))
    }

    /// Check whether `key` is cached
    ///
    /// A single metadata call; never touches the archive.
    pub async fn lookup(&self, key: &CacheKey) -> Option<CachedPage> {
        let path = self.page_path(key);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some(CachedPage {
                key: *key,
                path,
                size_bytes: meta.len(),
            }),
            _ => None,
        }
    }

    /// Read a cached artifact
    pub async fn read(&self, page: &CachedPage) -> Result<Bytes> {
        let bytes = tokio::fs::read(&page.path).await?;
        Ok(Bytes::from(bytes))
    }

    /// Store the artifact for `key`, replacing any existing file atomically
    pub async fn store(&self, key: &CacheKey, bytes: Bytes) -> Result<CachedPage> {
        let path = self.page_path(key);
        let size_bytes = bytes.len() as u64;
        let target = path.clone();

        spawn_blocking(move || write_atomic(&target, &bytes))
            .await
            .map_err(|e| Error::DiskWriteFailure {
                path: path.clone(),
                reason: format!("write task panicked: {}", e),
            })??;

        debug!(key = %key, size_bytes, "stored page in cache");
        Ok(CachedPage {
            key: *key,
            path,
            size_bytes,
        })
    }

    /// Path of the cached thumbnail, if present
    pub async fn lookup_thumbnail(&self, comic_id: ComicId, format: OutputFormat) -> Option<PathBuf> {
        let path = self.thumbnail_path(comic_id, format);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some(path),
            _ => None,
        }
    }

    /// Store a comic's thumbnail atomically
    pub async fn store_thumbnail(
        &self,
        comic_id: ComicId,
        format: OutputFormat,
        bytes: Bytes,
    ) -> Result<PathBuf> {
        let path = self.thumbnail_path(comic_id, format);
        let target = path.clone();

        spawn_blocking(move || write_atomic(&target, &bytes))
            .await
            .map_err(|e| Error::DiskWriteFailure {
                path: path.clone(),
                reason: format!("write task panicked: {}", e),
            })??;

        debug!(comic_id = %comic_id, format = %format, "stored thumbnail in cache");
        Ok(path)
    }

    /// Remove every cached page and thumbnail of a comic
    ///
    /// Returns the number of files removed.
    pub async fn purge_comic(&self, comic_id: ComicId) -> Result<u64> {
        let comic_dir = self.comic_dir(comic_id);
        let thumbnails: Vec<PathBuf> = OutputFormat::ALL
            .iter()
            .map(|format| self.thumbnail_path(comic_id, *format))
            .collect();

        let removed = spawn_blocking(move || -> Result<u64> {
            let mut removed = 0;
            if comic_dir.is_dir() {
                removed += count_files(&comic_dir)?.0;
                std::fs::remove_dir_all(&comic_dir)?;
            }
            for thumbnail in thumbnails {
                match std::fs::remove_file(&thumbnail) {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(Error::Io(e)),
                }
            }
            Ok(removed)
        })
        .await
        .map_err(|e| Error::Other(format!("purge task panicked: {}", e)))??;

        info!(comic_id = %comic_id, removed, "purged comic from cache");
        Ok(removed)
    }

    /// Walk the cache tree and total up its contents
    pub async fn usage(&self) -> Result<CacheUsage> {
        let pages = self.root.join(PAGES_DIR);
        let thumbnails = self.root.join(THUMBNAILS_DIR);

        spawn_blocking(move || -> Result<CacheUsage> {
            let (page_files, page_bytes) = count_files(&pages)?;
            let (thumbnail_files, thumbnail_bytes) = count_files(&thumbnails)?;
            Ok(CacheUsage {
                page_files,
                thumbnail_files,
                total_bytes: page_bytes + thumbnail_bytes,
            })
        })
        .await
        .map_err(|e| Error::Other(format!("usage task panicked: {}", e)))?
    }
}

/// Write `bytes` to a temp file next to `path`, then rename it into place
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let failure = |reason: String| Error::DiskWriteFailure {
        path: path.to_path_buf(),
        reason,
    };

    let dir = path
        .parent()
        .ok_or_else(|| failure("cache path has no parent directory".to_string()))?;
    std::fs::create_dir_all(dir)
        .map_err(|e| failure(format!("failed to create {}: {}", dir.display(), e)))?;

    let mut temp = tempfile::Builder::new()
        .prefix(".partial-")
        .tempfile_in(dir)
        .map_err(|e| failure(format!("failed to create temp file: {}", e)))?;
    temp.write_all(bytes)
        .map_err(|e| failure(format!("failed to write temp file: {}", e)))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| failure(format!("failed to sync temp file: {}", e)))?;
    temp.persist(path)
        .map_err(|e| failure(format!("failed to rename into place: {}", e.error)))?;
    Ok(())
}

/// Recursively count files and bytes below `dir` (missing dir counts as empty)
fn count_files(dir: &Path) -> Result<(u64, u64)> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((0, 0)),
        Err(e) => return Err(Error::Io(e)),
    };

    let (mut files, mut bytes) = (0, 0);
    for entry in entries {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            let (sub_files, sub_bytes) = count_files(&entry.path())?;
            files += sub_files;
            bytes += sub_bytes;
        } else if file_type.is_file() {
            files += 1;
            bytes += entry.metadata()?.len();
        }
    }
    Ok((files, bytes))
}
