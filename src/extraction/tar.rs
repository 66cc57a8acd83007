use crate::error::{Error, Result};
use crate::types::ArchiveType;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{ArchiveDecoder, corrupt, ensure_all_extracted};

/// Archive decoder for uncompressed TAR files (.cbt, .tar)
pub struct TarExtractor;

impl TarExtractor {
    fn open(archive_path: &Path) -> Result<tar::Archive<std::fs::File>> {
        let file = std::fs::File::open(archive_path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to open TAR archive: {}", e),
            ))
        })?;
        Ok(tar::Archive::new(file))
    }

    /// Walk every regular file entry, handing its name and reader to `each`
    fn for_each_file<F>(archive_path: &Path, mut each: F) -> Result<()>
    where
        F: FnMut(String, &mut tar::Entry<'_, std::fs::File>) -> Result<bool>,
    {
        let mut archive = Self::open(archive_path)?;
        let entries = archive
            .entries()
            .map_err(|e| corrupt(archive_path, format!("failed to read TAR archive: {}", e)))?;

        for entry in entries {
            let mut entry = entry
                .map_err(|e| corrupt(archive_path, format!("failed to read TAR entry: {}", e)))?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let name = entry
                .path()
                .map_err(|e| corrupt(archive_path, format!("invalid TAR entry name: {}", e)))?
                .to_string_lossy()
                .replace('\\', "/");
            if !each(name, &mut entry)? {
                break;
            }
        }
        Ok(())
    }
}

impl ArchiveDecoder for TarExtractor {
    fn archive_type(&self) -> ArchiveType {
        ArchiveType::Tar
    }

    fn list_members(&self, archive_path: &Path) -> Result<Vec<String>> {
        let mut members = Vec::new();
        Self::for_each_file(archive_path, |name, _| {
            members.push(name);
            Ok(true)
        })?;
        Ok(members)
    }

    fn extract_members(&self, archive_path: &Path, members: &[(String, PathBuf)]) -> Result<()> {
        debug!(
            ?archive_path,
            member_count = members.len(),
            "extracting TAR members"
        );

        let wanted: HashMap<&str, &Path> = members
            .iter()
            .map(|(member, target)| (member.as_str(), target.as_path()))
            .collect();
        let mut extracted = 0;

        Self::for_each_file(archive_path, |name, entry| {
            if let Some(target) = wanted.get(name.as_str()) {
                let mut outfile = std::fs::File::create(target)?;
                std::io::copy(entry, &mut outfile).map_err(|e| {
                    corrupt(
                        archive_path,
                        format!("failed to read TAR entry '{}': {}", name, e),
                    )
                })?;
                extracted += 1;
            }
            Ok(extracted < members.len())
        })?;

        ensure_all_extracted(archive_path, members, extracted)
    }
}
