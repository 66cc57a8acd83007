//! Output format negotiation from a client's `Accept` header

use crate::types::OutputFormat;

/// Pick the output format for a client capability string
///
/// WebP wins if the client mentions it, then PNG, and JPEG is the fallback
/// for everything else (including an empty or missing header). Matching is
/// case-insensitive and ignores q-values; the source image is never
/// consulted.
pub fn choose_format(accept: &str) -> OutputFormat {
    let accept = accept.to_ascii_lowercase();

    if accept.contains("image/webp") {
        OutputFormat::Webp
    } else if accept.contains("image/png") {
        OutputFormat::Png
    } else {
        OutputFormat::Jpeg
    }
}

/// [`choose_format`] for an optional header value
pub fn choose_format_opt(accept: Option<&str>) -> OutputFormat {
    accept.map(choose_format).unwrap_or_default()
}
