//! Catalog interface consumed by the page engine
//!
//! The engine never owns bibliographic data. It only asks the catalog where
//! a comic's archive lives, how many pages it declares, and which comics
//! share a content hash.
//!
//! - [`MemoryCatalog`] — in-process map, for embedding and tests
//! - [`SqliteCatalog`] — reads a `comics` table through sqlx

mod memory;
mod sqlite;


pub use memory::MemoryCatalog;
pub use sqlite::SqliteCatalog;

use crate::error::{Error, Result};
use crate::types::{ComicFile, ComicId, ContentHash};
use async_trait::async_trait;

/// Read-only view of the comic catalog
///
/// # Examples
///
/// ```no_run
/// use comicshelf::catalog::{ComicCatalog, MemoryCatalog};
/// use comicshelf::ComicId;
///
/// # #[tokio::main]
/// # async fn main() -> comicshelf::Result<()> {
/// let catalog = MemoryCatalog::new();
/// catalog.insert(ComicId(7), "/library/saga-01.cbz", Some(40)).await;
///
/// let file = catalog.get_comic_file(ComicId(7)).await?;
/// assert_eq!(file.declared_page_count, Some(40));
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait ComicCatalog: Send + Sync {
    /// Resolve a comic to its archive on disk
    ///
    /// Fails with [`Error::ComicNotFound`] when the id is unknown or the
    /// archive no longer exists.
    async fn get_comic_file(&self, comic_id: ComicId) -> Result<ComicFile>;

    /// Every comic whose archive has the given content hash
    async fn comics_with_hash(&self, hash: &ContentHash) -> Result<Vec<ComicId>>;
}

/// Turn a catalog row into a [`ComicFile`], checking the archive still exists
pub(crate) async fn existing_file(comic_id: ComicId, file: ComicFile) -> Result<ComicFile> {
    match tokio::fs::metadata(&file.path).await {
        Ok(meta) if meta.is_file() => Ok(file),
        Ok(_) => Err(Error::ComicNotFound {
            comic_id,
            reason: format!("{} is not a regular file", file.path.display()),
        }),
        Err(e) => Err(Error::ComicNotFound {
            comic_id,
            reason: format!("archive {} is missing: {}", file.path.display(), e),
        }),
    }
}
