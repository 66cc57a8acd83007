//! How much of an archive to decode for one request

use crate::config::ExtractionConfig;
use crate::types::PageRange;

/// Decode plan for a cache miss
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeStrategy {
    /// Decode only the requested page in the foreground; following pages
    /// are warmed by a background preload
    SinglePage,
    /// Decode the requested page and the preload window in one pass
    Ranged,
}

impl DecodeStrategy {
    /// Pick a strategy from the archive size
    ///
    /// Archives strictly larger than the threshold are decoded in ranged
    /// windows so a huge archive is walked as few times as possible.
    pub fn for_archive(size_bytes: u64, threshold_bytes: u64) -> Self {
        if size_bytes > threshold_bytes {
            DecodeStrategy::Ranged
        } else {
            DecodeStrategy::SinglePage
        }
    }
}

/// Effective preload count for a request
///
/// `None` falls back to the configured default; client values are capped
/// at `max_preload_count`.
pub fn effective_preload(requested: Option<u32>, config: &ExtractionConfig) -> u32 {
    requested
        .unwrap_or(config.preload_count)
        .min(config.max_preload_count)
}

/// Pages after `page` to warm, clipped to the declared page count
///
/// `None` when there is nothing to preload.
pub fn following_pages(page: u32, preload: u32, declared_page_count: Option<u32>) -> Option<PageRange> {
    if preload == 0 {
        return None;
    }
    let start = page.checked_add(1)?;
    let window = PageRange::new(start, page.saturating_add(preload));
    match declared_page_count {
        Some(count) => window.clip(count),
        None => Some(window),
    }
}
