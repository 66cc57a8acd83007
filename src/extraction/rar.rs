use crate::error::{Error, Result};
use crate::types::ArchiveType;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{ArchiveDecoder, corrupt, ensure_all_extracted};

/// Archive decoder for RAR files (.cbr, .rar)
pub struct RarExtractor;

impl RarExtractor {
    /// Member name as reported in listings, with `/` separators
    fn member_name(filename: &Path) -> String {
        filename.to_string_lossy().replace('\\', "/")
    }

    /// Convert an unrar error to our error type
    fn convert_unrar_error(e: unrar::error::UnrarError, archive_path: &Path) -> Error {
        corrupt(archive_path, format!("failed to read RAR archive: {}", e))
    }
}

impl ArchiveDecoder for RarExtractor {
    fn archive_type(&self) -> ArchiveType {
        ArchiveType::Rar
    }

    fn list_members(&self, archive_path: &Path) -> Result<Vec<String>> {
        let listing = unrar::Archive::new(archive_path)
            .open_for_listing()
            .map_err(|e| Self::convert_unrar_error(e, archive_path))?;

        let mut members = Vec::new();
        for header in listing {
            let header = header.map_err(|e| Self::convert_unrar_error(e, archive_path))?;
            if !header.is_directory() {
                members.push(Self::member_name(&header.filename));
            }
        }
        Ok(members)
    }

    fn extract_members(&self, archive_path: &Path, members: &[(String, PathBuf)]) -> Result<()> {
        debug!(
            ?archive_path,
            member_count = members.len(),
            "extracting RAR members"
        );

        let wanted: HashMap<&str, &Path> = members
            .iter()
            .map(|(member, target)| (member.as_str(), target.as_path()))
            .collect();

        let processor = unrar::Archive::new(archive_path)
            .open_for_processing()
            .map_err(|e| Self::convert_unrar_error(e, archive_path))?;

        let mut extracted = 0;

        // RAR is read sequentially through the header state machine
        let mut at_header = processor;
        loop {
            let at_file = match at_header.read_header() {
                Ok(Some(entry_processor)) => entry_processor,
                Ok(None) => break,
                Err(e) => return Err(Self::convert_unrar_error(e, archive_path)),
            };

            let header = at_file.entry();
            let target = if header.is_directory() {
                None
            } else {
                wanted
                    .get(Self::member_name(&header.filename).as_str())
                    .copied()
            };

            at_header = match target {
                Some(target) => {
                    let next = at_file
                        .extract_to(target)
                        .map_err(|e| Self::convert_unrar_error(e, archive_path))?;
                    extracted += 1;
                    next
                }
                None => at_file
                    .skip()
                    .map_err(|e| Self::convert_unrar_error(e, archive_path))?,
            };

            if extracted == members.len() {
                break;
            }
        }

        ensure_all_extracted(archive_path, members, extracted)
    }
}
