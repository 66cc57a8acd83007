//! Content-hash duplicate detection
//!
//! Two comics are duplicates when their archives are byte-identical,
//! whatever their paths or names. The hash is SHA-256 over the full file.

use crate::catalog::ComicCatalog;
use crate::error::{Error, Result};
use crate::types::{ComicId, ContentHash};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::spawn_blocking;
use tracing::{debug, info};
use utoipa::ToSchema;

/// Catalog comics that share an archive's content
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DuplicateReport {
    /// The hashed file
    #[schema(value_type = String)]
    pub path: PathBuf,
    /// Its content hash
    pub hash: ContentHash,
    /// Comics in the catalog with the same hash, ascending
    pub duplicates: Vec<ComicId>,
}

impl DuplicateReport {
    /// Whether any catalog comic already has this content
    pub fn has_duplicates(&self) -> bool {
        !self.duplicates.is_empty()
    }
}

/// Computes content hashes and looks them up in the catalog
#[derive(Clone)]
pub struct DuplicateDetector {
    catalog: Arc<dyn ComicCatalog>,
}

impl DuplicateDetector {
    /// Create a detector that consults `catalog`
    pub fn new(catalog: Arc<dyn ComicCatalog>) -> Self {
        Self { catalog }
    }

    /// Hash a file's bytes (blocking, streams the file)
    pub fn hash_file_blocking(path: &Path) -> Result<ContentHash> {
        let mut file = std::fs::File::open(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to open {} for hashing: {}", path.display(), e),
            ))
        })?;

        let mut hasher = Sha256::new();
        std::io::copy(&mut file, &mut hasher)?;

        Ok(ContentHash::from_digest(&hasher.finalize()))
    }

    /// Hash a file's bytes off the async runtime
    pub async fn hash_file(path: &Path) -> Result<ContentHash> {
        let owned = path.to_path_buf();
        let hash = spawn_blocking(move || Self::hash_file_blocking(&owned))
            .await
            .map_err(|e| Error::Other(format!("hash task panicked: {}", e)))??;

        debug!(?path, hash = %hash, "hashed archive");
        Ok(hash)
    }

    /// Hash a file and list catalog comics with identical content
    pub async fn find_duplicates(&self, path: &Path) -> Result<DuplicateReport> {
        let hash = Self::hash_file(path).await?;
        let duplicates = self.catalog.comics_with_hash(&hash).await?;

        if !duplicates.is_empty() {
            info!(
                ?path,
                hash = %hash,
                count = duplicates.len(),
                "archive duplicates existing comics"
            );
        }

        Ok(DuplicateReport {
            path: path.to_path_buf(),
            hash,
            duplicates,
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use tempfile::TempDir;

    #[tokio::test]
    async fn identical_content_at_different_paths_hashes_equal() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.cbz");
        let b = dir.path().join("nested-copy-with-other-name.cbr");
        std::fs::write(&a, b"same archive bytes").unwrap();
        std::fs::write(&b, b"same archive bytes").unwrap();

        let hash_a = DuplicateDetector::hash_file(&a).await.unwrap();
        let hash_b = DuplicateDetector::hash_file(&b).await.unwrap();
        assert_eq!(hash_a, hash_b);
    }

    #[tokio::test]
    async fn single_byte_difference_changes_hash() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.cbz");
        let b = dir.path().join("b.cbz");
        let mut content = vec![7u8; 200_000];
        std::fs::write(&a, &content).unwrap();
        content[150_000] = 8;
        std::fs::write(&b, &content).unwrap();

        assert_ne!(
            DuplicateDetector::hash_file(&a).await.unwrap(),
            DuplicateDetector::hash_file(&b).await.unwrap()
        );
    }

    #[test]
    fn hash_matches_known_sha256() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc");
        std::fs::write(&path, b"abc").unwrap();

        let hash = DuplicateDetector::hash_file_blocking(&path).unwrap();
        assert_eq!(
            hash.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn hash_covers_files_spanning_many_reads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("omnibus.cbz");
        let content: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &content).unwrap();

        let hash = DuplicateDetector::hash_file_blocking(&path).unwrap();
        assert_eq!(hash, ContentHash::from_digest(&Sha256::digest(&content)));
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = DuplicateDetector::hash_file(&dir.path().join("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn find_duplicates_consults_catalog() {
        let dir = TempDir::new().unwrap();
        let incoming = dir.path().join("incoming.cbz");
        std::fs::write(&incoming, b"archive").unwrap();
        let hash = DuplicateDetector::hash_file(&incoming).await.unwrap();

        let catalog = Arc::new(MemoryCatalog::new());
        catalog.insert(ComicId(4), "/library/old.cbz", None).await;
        catalog.insert(ComicId(5), "/library/other.cbz", None).await;
        catalog.set_content_hash(ComicId(4), hash.clone()).await;

        let detector = DuplicateDetector::new(catalog.clone());
        let report = detector.find_duplicates(&incoming).await.unwrap();
        assert!(report.has_duplicates());
        assert_eq!(report.duplicates, vec![ComicId(4)]);
        assert_eq!(report.hash, hash);

        std::fs::write(&incoming, b"different archive").unwrap();
        let report = detector.find_duplicates(&incoming).await.unwrap();
        assert!(!report.has_duplicates());
    }
}
