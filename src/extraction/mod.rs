//! Archive decoding for comic books
//!
//! This module turns ZIP, RAR, 7z and TAR comic archives into naturally
//! ordered page images. Each container format is handled by one
//! [`ArchiveDecoder`] registered in a [`DecoderRegistry`]; the registry
//! owns the shared pipeline (member listing, page filtering, natural sort,
//! range selection, extraction into a [`TempWorkspace`]).

mod rar;
mod sevenz;
mod shared;
mod tar;
mod workspace;
mod zip;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

// Re-exports
pub use rar::RarExtractor;
pub use sevenz::SevenZipExtractor;
pub use shared::{
    detect_archive_type, is_page_image, natural_cmp, order_pages, resolve_archive_type,
    sniff_archive_type,
};
pub use tar::TarExtractor;
pub use workspace::{
    STALE_WORKSPACE_AGE, TempWorkspace, WORKSPACE_PREFIX, sweep_stale_workspaces,
};
pub use zip::ZipExtractor;

use crate::error::{Error, ExtractionError, Result};
use crate::types::{ArchiveHandle, ArchiveType, DecodedArchive, PageRange, RawImage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::spawn_blocking;
use tracing::{debug, info, warn};

/// A container format the page pipeline can read
///
/// Implementations are blocking; the registry always calls them from
/// `spawn_blocking`. Output is only ever written to the target paths the
/// registry hands out, all of which live inside one [`TempWorkspace`].
pub trait ArchiveDecoder: Send + Sync {
    /// Container format handled by this decoder
    fn archive_type(&self) -> ArchiveType;

    /// Names of every file member in the archive, in archive order
    fn list_members(&self, archive: &Path) -> Result<Vec<String>>;

    /// Write each `(member, target)` pair's content to `target`
    ///
    /// Members not listed are skipped. Every requested member must be
    /// written or the call fails.
    fn extract_members(&self, archive: &Path, members: &[(String, PathBuf)]) -> Result<()>;
}

/// Maps container formats to decoders and runs the decode pipeline
#[derive(Clone)]
pub struct DecoderRegistry {
    decoders: HashMap<ArchiveType, Arc<dyn ArchiveDecoder>>,
    image_extensions: Arc<Vec<String>>,
    temp_dir: PathBuf,
}

impl std::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderRegistry")
            .field("formats", &self.decoders.keys().collect::<Vec<_>>())
            .field("image_extensions", &self.image_extensions)
            .field("temp_dir", &self.temp_dir)
            .finish()
    }
}

impl DecoderRegistry {
    /// Create a registry without any decoders
    pub fn new(temp_dir: impl Into<PathBuf>, image_extensions: Vec<String>) -> Self {
        Self {
            decoders: HashMap::new(),
            image_extensions: Arc::new(image_extensions),
            temp_dir: temp_dir.into(),
        }
    }

    /// Create a registry with the ZIP, RAR, 7z and TAR decoders installed
    pub fn with_default_decoders(temp_dir: impl Into<PathBuf>, image_extensions: Vec<String>) -> Self {
        let mut registry = Self::new(temp_dir, image_extensions);
        registry.register(Arc::new(ZipExtractor));
        registry.register(Arc::new(RarExtractor));
        registry.register(Arc::new(SevenZipExtractor));
        registry.register(Arc::new(TarExtractor));
        registry
    }

    /// Install a decoder, replacing any previous one for the same format
    pub fn register(&mut self, decoder: Arc<dyn ArchiveDecoder>) {
        self.decoders.insert(decoder.archive_type(), decoder);
    }

    /// Decoder for a container format, if one is registered
    pub fn decoder_for(&self, archive_type: ArchiveType) -> Option<Arc<dyn ArchiveDecoder>> {
        self.decoders.get(&archive_type).cloned()
    }

    /// Parent directory for extraction workspaces
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    fn resolve(&self, archive: &Path) -> Result<Arc<dyn ArchiveDecoder>> {
        resolve_archive_type(archive)
            .and_then(|archive_type| self.decoder_for(archive_type))
            .ok_or_else(|| {
                Error::Extraction(ExtractionError::UnsupportedFormat {
                    archive: archive.to_path_buf(),
                })
            })
    }

    /// Ordered page member names of an archive
    fn list_pages(&self, decoder: &dyn ArchiveDecoder, archive: &Path) -> Result<Vec<String>> {
        let members = decoder.list_members(archive)?;
        let member_count = members.len();
        let pages = order_pages(members, &self.image_extensions);

        debug!(
            ?archive,
            format = decoder.archive_type().name(),
            member_count,
            page_count = pages.len(),
            "listed archive members"
        );

        if pages.is_empty() {
            return Err(Error::Extraction(ExtractionError::NoImagesFound {
                archive: archive.to_path_buf(),
            }));
        }
        Ok(pages)
    }

    /// Count the pages of an archive without extracting anything (blocking)
    pub fn page_count_blocking(&self, archive: &Path) -> Result<u32> {
        let decoder = self.resolve(archive)?;
        let pages = self.list_pages(decoder.as_ref(), archive)?;
        Ok(pages.len() as u32)
    }

    /// Decode the pages of `archive` that fall in `range` (blocking)
    ///
    /// `None` decodes every page. A range starting past the last page
    /// yields an empty image list with the true page count, leaving
    /// bounds errors to the caller.
    pub fn decode_blocking(
        &self,
        archive: &ArchiveHandle,
        range: Option<PageRange>,
    ) -> Result<DecodedArchive> {
        let path = archive.path.as_path();
        let decoder = self.resolve(path)?;
        let pages = self.list_pages(decoder.as_ref(), path)?;
        let page_count = pages.len() as u32;

        let selected = shared::select_pages(&pages, range);
        if selected.is_empty() {
            return Ok(DecodedArchive {
                page_count,
                images: Vec::new(),
            });
        }

        info!(
            ?path,
            format = decoder.archive_type().name(),
            size_bytes = archive.size_bytes,
            page_count,
            first_page = selected[0].0,
            selected = selected.len(),
            "decoding archive pages"
        );

        let workspace = TempWorkspace::create(&self.temp_dir)?;
        let targets: Vec<(String, PathBuf)> = selected
            .iter()
            .map(|(page, member)| {
                (
                    member.clone(),
                    workspace.file(&shared::workspace_file_name(*page, member)),
                )
            })
            .collect();

        if let Err(e) = decoder.extract_members(path, &targets) {
            warn!(?path, error = %e, "archive extraction failed");
            return Err(e);
        }

        let mut images = Vec::with_capacity(selected.len());
        for ((page, member), (_, target)) in selected.into_iter().zip(targets.iter()) {
            let bytes = std::fs::read(target).map_err(|e| {
                Error::Extraction(ExtractionError::CorruptArchive {
                    archive: path.to_path_buf(),
                    reason: format!("member '{}' was not extracted: {}", member, e),
                })
            })?;
            images.push(RawImage {
                page,
                name: member,
                bytes,
            });
        }

        // close() logs its own failure
        let _ = workspace.close();

        Ok(DecodedArchive { page_count, images })
    }

    /// Decode the pages of `archive` that fall in `range` off the async runtime
    pub async fn decode(
        &self,
        archive: &ArchiveHandle,
        range: Option<PageRange>,
    ) -> Result<DecodedArchive> {
        let registry = self.clone();
        let archive_owned = archive.clone();
        spawn_blocking(move || registry.decode_blocking(&archive_owned, range))
            .await
            .map_err(|e| {
                Error::Extraction(ExtractionError::CorruptArchive {
                    archive: archive.path.clone(),
                    reason: format!("decode task panicked: {}", e),
                })
            })?
    }

    /// Count the pages of an archive off the async runtime
    pub async fn page_count(&self, archive: &Path) -> Result<u32> {
        let registry = self.clone();
        let path = archive.to_path_buf();
        spawn_blocking(move || registry.page_count_blocking(&path))
            .await
            .map_err(|e| {
                Error::Extraction(ExtractionError::CorruptArchive {
                    archive: archive.to_path_buf(),
                    reason: format!("listing task panicked: {}", e),
                })
            })?
    }
}

/// Map a decoder library failure to [`ExtractionError::CorruptArchive`]
pub(crate) fn corrupt(archive: &Path, reason: impl std::fmt::Display) -> Error {
    Error::Extraction(ExtractionError::CorruptArchive {
        archive: archive.to_path_buf(),
        reason: reason.to_string(),
    })
}

/// Fail if any requested member was not produced by the decoder
pub(crate) fn ensure_all_extracted(
    archive: &Path,
    members: &[(String, PathBuf)],
    extracted: usize,
) -> Result<()> {
    if extracted < members.len() {
        let missing: Vec<&str> = members
            .iter()
            .filter(|(_, target)| !target.exists())
            .map(|(member, _)| member.as_str())
            .collect();
        return Err(corrupt(
            archive,
            format!("members missing from archive: {}", missing.join(", ")),
        ));
    }
    Ok(())
}
