use crate::error::Result;
use crate::types::ArchiveType;
use sevenz_rust::{Password, SevenZReader};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{ArchiveDecoder, corrupt, ensure_all_extracted};

/// Archive decoder for 7z files (.cb7, .7z)
pub struct SevenZipExtractor;

impl SevenZipExtractor {
    fn open(archive_path: &Path) -> Result<SevenZReader<std::fs::File>> {
        SevenZReader::open(archive_path, Password::empty())
            .map_err(|e| corrupt(archive_path, format!("failed to read 7z archive: {}", e)))
    }
}

impl ArchiveDecoder for SevenZipExtractor {
    fn archive_type(&self) -> ArchiveType {
        ArchiveType::SevenZip
    }

    fn list_members(&self, archive_path: &Path) -> Result<Vec<String>> {
        let reader = Self::open(archive_path)?;
        Ok(reader
            .archive()
            .files
            .iter()
            .filter(|entry| !entry.is_directory())
            .map(|entry| entry.name().replace('\\', "/"))
            .collect())
    }

    fn extract_members(&self, archive_path: &Path, members: &[(String, PathBuf)]) -> Result<()> {
        debug!(
            ?archive_path,
            member_count = members.len(),
            "extracting 7z members"
        );

        let wanted: HashMap<&str, &Path> = members
            .iter()
            .map(|(member, target)| (member.as_str(), target.as_path()))
            .collect();

        let mut reader = Self::open(archive_path)?;
        let mut extracted = 0;

        // Solid blocks must be read in order, so unwanted entries are drained
        reader
            .for_each_entries(|entry, data| {
                let name = entry.name().replace('\\', "/");
                match wanted.get(name.as_str()) {
                    Some(target) if !entry.is_directory() => {
                        let mut outfile = std::fs::File::create(target)?;
                        std::io::copy(data, &mut outfile)?;
                        extracted += 1;
                    }
                    _ => {
                        std::io::copy(data, &mut std::io::sink())?;
                    }
                }
                Ok(true)
            })
            .map_err(|e| corrupt(archive_path, format!("failed to extract 7z archive: {}", e)))?;

        ensure_all_extracted(archive_path, members, extracted)
    }
}
