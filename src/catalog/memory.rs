use crate::error::{Error, Result};
use crate::types::{ComicFile, ComicId, ContentHash};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

use super::{ComicCatalog, existing_file};

#[derive(Clone, Debug)]
struct Entry {
    path: PathBuf,
    page_count: Option<u32>,
    content_hash: Option<ContentHash>,
}

/// Catalog held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    comics: RwLock<HashMap<ComicId, Entry>>,
}

impl MemoryCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a comic
    pub async fn insert(&self, comic_id: ComicId, path: impl Into<PathBuf>, page_count: Option<u32>) {
        self.comics.write().await.insert(
            comic_id,
            Entry {
                path: path.into(),
                page_count,
                content_hash: None,
            },
        );
    }

    /// Record the content hash of a comic's archive
    ///
    /// Returns false if the comic is unknown.
    pub async fn set_content_hash(&self, comic_id: ComicId, hash: ContentHash) -> bool {
        match self.comics.write().await.get_mut(&comic_id) {
            Some(entry) => {
                entry.content_hash = Some(hash);
                true
            }
            None => false,
        }
    }

    /// Remove a comic
    pub async fn remove(&self, comic_id: ComicId) -> bool {
        self.comics.write().await.remove(&comic_id).is_some()
    }
}

#[async_trait]
impl ComicCatalog for MemoryCatalog {
    async fn get_comic_file(&self, comic_id: ComicId) -> Result<ComicFile> {
        let file = {
            let comics = self.comics.read().await;
            let entry = comics.get(&comic_id).ok_or_else(|| Error::ComicNotFound {
                comic_id,
                reason: "not in catalog".to_string(),
            })?;
            ComicFile {
                path: entry.path.clone(),
                declared_page_count: entry.page_count,
            }
        };
        existing_file(comic_id, file).await
    }

    async fn comics_with_hash(&self, hash: &ContentHash) -> Result<Vec<ComicId>> {
        let comics = self.comics.read().await;
        let mut ids: Vec<ComicId> = comics
            .iter()
            .filter(|(_, entry)| entry.content_hash.as_ref() == Some(hash))
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        Ok(ids)
    }
}
