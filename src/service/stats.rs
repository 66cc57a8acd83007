use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use utoipa::ToSchema;

/// Running counters of the page service
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) cache_hits: AtomicU64,
    pub(crate) cache_misses: AtomicU64,
    pub(crate) decodes: AtomicU64,
    pub(crate) pages_extracted: AtomicU64,
    pub(crate) transcodes: AtomicU64,
    pub(crate) cache_write_failures: AtomicU64,
    pub(crate) preloads_scheduled: AtomicU64,
    pub(crate) preload_failures: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ServiceStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        ServiceStats {
            cache_hits: load(&self.cache_hits),
            cache_misses: load(&self.cache_misses),
            decodes: load(&self.decodes),
            pages_extracted: load(&self.pages_extracted),
            transcodes: load(&self.transcodes),
            cache_write_failures: load(&self.cache_write_failures),
            preloads_scheduled: load(&self.preloads_scheduled),
            preload_failures: load(&self.preload_failures),
        }
    }
}

/// Point-in-time copy of the service counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ServiceStats {
    /// Requests answered from the cache (pages and thumbnails)
    pub cache_hits: u64,
    /// Page requests that were not cached
    pub cache_misses: u64,
    /// Archive decode passes
    pub decodes: u64,
    /// Page images pulled out of archives
    pub pages_extracted: u64,
    /// Images converted to an output format (including pass-through)
    pub transcodes: u64,
    /// Cache entries that could not be written
    pub cache_write_failures: u64,
    /// Background preloads started
    pub preloads_scheduled: u64,
    /// Preloaded pages that failed to decode or transcode
    pub preload_failures: u64,
}
