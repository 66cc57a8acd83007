use crate::error::{Error, Result};
use crate::types::ArchiveType;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{ArchiveDecoder, corrupt, ensure_all_extracted};

/// Archive decoder for ZIP files (.cbz, .zip)
pub struct ZipExtractor;

impl ZipExtractor {
    fn open(archive_path: &Path) -> Result<zip::ZipArchive<std::fs::File>> {
        let file = std::fs::File::open(archive_path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to open ZIP archive: {}", e),
            ))
        })?;

        zip::ZipArchive::new(file)
            .map_err(|e| corrupt(archive_path, format!("failed to read ZIP archive: {}", e)))
    }
}

impl ArchiveDecoder for ZipExtractor {
    fn archive_type(&self) -> ArchiveType {
        ArchiveType::Zip
    }

    fn list_members(&self, archive_path: &Path) -> Result<Vec<String>> {
        let archive = Self::open(archive_path)?;
        Ok(archive
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .map(str::to_string)
            .collect())
    }

    fn extract_members(&self, archive_path: &Path, members: &[(String, PathBuf)]) -> Result<()> {
        debug!(
            ?archive_path,
            member_count = members.len(),
            "extracting ZIP members"
        );

        let mut archive = Self::open(archive_path)?;
        let mut extracted = 0;

        // Random access: only the requested members are inflated
        for (member, target) in members {
            let mut entry = archive.by_name(member).map_err(|e| {
                corrupt(
                    archive_path,
                    format!("failed to read ZIP entry '{}': {}", member, e),
                )
            })?;

            let mut outfile = std::fs::File::create(target).map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("failed to create output file: {}", e),
                ))
            })?;

            std::io::copy(&mut entry, &mut outfile).map_err(|e| {
                corrupt(
                    archive_path,
                    format!("failed to inflate ZIP entry '{}': {}", member, e),
                )
            })?;
            extracted += 1;
        }

        ensure_all_extracted(archive_path, members, extracted)
    }
}
