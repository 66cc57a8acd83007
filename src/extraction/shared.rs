use crate::types::{ArchiveType, PageRange};
use std::cmp::Ordering;
use std::io::Read;
use std::path::Path;

/// Detect archive type by file extension
///
/// Supports the comic-book extensions (.cbz, .cbr, .cb7, .cbt) and their
/// generic counterparts (.zip, .rar, .7z, .tar).
pub fn detect_archive_type(path: &Path) -> Option<ArchiveType> {
    let ext = path.extension()?.to_str()?.to_lowercase();

    match ext.as_str() {
        "cbz" | "zip" => Some(ArchiveType::Zip),
        "cbr" | "rar" => Some(ArchiveType::Rar),
        "cb7" | "7z" => Some(ArchiveType::SevenZip),
        "cbt" | "tar" => Some(ArchiveType::Tar),
        _ => None,
    }
}

/// Identify a container from its leading bytes
pub fn sniff_archive_type(header: &[u8]) -> Option<ArchiveType> {
    const ZIP: &[u8] = b"PK\x03\x04";
    const ZIP_EMPTY: &[u8] = b"PK\x05\x06";
    const RAR: &[u8] = b"Rar!\x1a\x07";
    const SEVEN_ZIP: &[u8] = b"7z\xbc\xaf\x27\x1c";
    const TAR_MAGIC_OFFSET: usize = 257;

    if header.starts_with(ZIP) || header.starts_with(ZIP_EMPTY) {
        Some(ArchiveType::Zip)
    } else if header.starts_with(RAR) {
        Some(ArchiveType::Rar)
    } else if header.starts_with(SEVEN_ZIP) {
        Some(ArchiveType::SevenZip)
    } else if header.len() >= TAR_MAGIC_OFFSET + 5
        && &header[TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + 5] == b"ustar"
    {
        Some(ArchiveType::Tar)
    } else {
        None
    }
}

/// Resolve the container type of an archive on disk
///
/// Magic bytes win over the extension; the extension is the fallback for
/// containers without a signature (old-style tar files) and for files that
/// cannot be read here (the decoder will report the real failure).
pub fn resolve_archive_type(path: &Path) -> Option<ArchiveType> {
    let mut header = [0u8; 512];
    let sniffed = std::fs::File::open(path).ok().and_then(|mut file| {
        let mut filled = 0;
        while filled < header.len() {
            match file.read(&mut header[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(_) => return None,
            }
        }
        sniff_archive_type(&header[..filled])
    });

    sniffed.or_else(|| detect_archive_type(path))
}

/// Whether an archive member is a page image
///
/// Directories, hidden files, and macOS resource-fork folders are skipped.
pub fn is_page_image(member: &str, image_extensions: &[String]) -> bool {
    let normalized = member.replace('\\', "/");
    if normalized.ends_with('/') {
        return false;
    }
    if normalized
        .split('/')
        .any(|component| component.eq_ignore_ascii_case("__MACOSX"))
    {
        return false;
    }

    let file_name = normalized.rsplit('/').next().unwrap_or(&normalized);
    if file_name.starts_with('.') {
        return false;
    }

    match file_name.rsplit_once('.') {
        Some((_, ext)) => image_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

/// Numeric-aware string comparison
///
/// Runs of ASCII digits compare by value, everything else compares
/// case-insensitively, so `page2.jpg` sorts before `page10.jpg`. Ties are
/// broken by the raw strings to keep the order total.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();
    let (mut i, mut j) = (0, 0);

    while i < a_bytes.len() && j < b_bytes.len() {
        let (ac, bc) = (a_bytes[i], b_bytes[j]);

        if ac.is_ascii_digit() && bc.is_ascii_digit() {
            let a_end = digit_run_end(a_bytes, i);
            let b_end = digit_run_end(b_bytes, j);
            match compare_digit_runs(&a_bytes[i..a_end], &b_bytes[j..b_end]) {
                Ordering::Equal => {
                    i = a_end;
                    j = b_end;
                }
                other => return other,
            }
        } else {
            // Work on chars so multi-byte names compare sensibly
            let a_char = a[i..].chars().next().unwrap_or_default();
            let b_char = b[j..].chars().next().unwrap_or_default();
            match a_char.to_lowercase().cmp(b_char.to_lowercase()) {
                Ordering::Equal => {
                    i += a_char.len_utf8();
                    j += b_char.len_utf8();
                }
                other => return other,
            }
        }
    }

    (a_bytes.len() - i)
        .cmp(&(b_bytes.len() - j))
        .then_with(|| a.cmp(b))
}

fn digit_run_end(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|c| !c.is_ascii_digit())
        .map_or(bytes.len(), |offset| start + offset)
}

/// Compare two digit runs by numeric value without parsing (no overflow)
fn compare_digit_runs(a: &[u8], b: &[u8]) -> Ordering {
    let a_trimmed = trim_leading_zeros(a);
    let b_trimmed = trim_leading_zeros(b);
    a_trimmed
        .len()
        .cmp(&b_trimmed.len())
        .then_with(|| a_trimmed.cmp(b_trimmed))
        // "007" before "7" keeps zero-padded names stable
        .then_with(|| b.len().cmp(&a.len()))
}

fn trim_leading_zeros(digits: &[u8]) -> &[u8] {
    let first_non_zero = digits.iter().position(|&d| d != b'0');
    match first_non_zero {
        Some(pos) => &digits[pos..],
        None => &digits[digits.len().saturating_sub(1)..],
    }
}

/// Filter archive members down to page images in natural order
pub fn order_pages(members: Vec<String>, image_extensions: &[String]) -> Vec<String> {
    let mut pages: Vec<String> = members
        .into_iter()
        .filter(|name| is_page_image(name, image_extensions))
        .collect();
    pages.sort_by(|a, b| natural_cmp(a, b));
    pages
}

/// Pick the (1-based page, member name) pairs that fall in `range`
///
/// `None` selects every page.
pub fn select_pages(pages: &[String], range: Option<PageRange>) -> Vec<(u32, String)> {
    pages
        .iter()
        .enumerate()
        .map(|(index, name)| (index as u32 + 1, name))
        .filter(|(page, _)| range.is_none_or(|r| r.contains(*page)))
        .map(|(page, name)| (page, name.clone()))
        .collect()
}

/// Workspace file name for an extracted page
///
/// Derived from the page position, never from the member name, so archive
/// entries cannot escape the workspace.
pub fn workspace_file_name(page: u32, member: &str) -> String {
    let ext = member
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string());
    format!("{:05}.{}", page, ext)
}
