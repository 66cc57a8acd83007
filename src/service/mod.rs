//! Page request coordination
//!
//! [`PageService`] answers "page N of comic C, in a format this client
//! accepts". A request is served from the [`PageCache`] when possible.
//! On a miss the archive is decoded (the single page, or a ranged window
//! for archives above the size threshold), the image is transcoded and
//! stored, and the following pages are warmed in the background.
//!
//! Concurrent requests for the same cache key share one decode through
//! [`InFlight`]. Producer work runs on tracked tasks, so a client that
//! disconnects mid-request does not cancel it; [`PageService::shutdown`]
//! waits for that work to finish.

mod inflight;
mod stats;
mod strategy;


pub use inflight::{Claim, Flight, FlightGuard, FlightResult, InFlight};
pub use stats::ServiceStats;
pub use strategy::{DecodeStrategy, effective_preload, following_pages};

use crate::cache::{CacheUsage, PageCache};
use crate::catalog::ComicCatalog;
use crate::config::Config;
use crate::error::{Error, ExtractionError, Result};
use crate::extraction::{DecoderRegistry, STALE_WORKSPACE_AGE, sweep_stale_workspaces};
use crate::negotiate::choose_format_opt;
use crate::transcode::ImageTranscoder;
use crate::types::{
    ArchiveHandle, CacheKey, ComicFile, ComicId, OutputFormat, PageRange, PageResponse, RawImage,
};
use bytes::Bytes;
use futures::future::join_all;
use stats::Counters;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::spawn_blocking;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// How long shutdown waits for background extraction before giving up
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

type PageGuard = FlightGuard<CacheKey, Bytes>;
type ThumbnailKey = (ComicId, OutputFormat);

/// One client request for a page
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtractionRequest {
    /// Comic to read from
    pub comic_id: ComicId,
    /// 1-based page number
    pub page: u32,
    /// Negotiated output format
    pub format: OutputFormat,
    /// Pages after this one to warm; `None` uses the configured default
    pub preload_count: Option<u32>,
}

impl ExtractionRequest {
    /// Build a request, negotiating the format from an `Accept` header
    pub fn new(comic_id: ComicId, page: u32, accept: Option<&str>) -> Self {
        Self {
            comic_id,
            page,
            format: choose_format_opt(accept),
            preload_count: None,
        }
    }

    /// Override the number of pages to preload
    pub fn with_preload(mut self, preload_count: u32) -> Self {
        self.preload_count = Some(preload_count);
        self
    }
}

struct Inner {
    config: Config,
    catalog: Arc<dyn ComicCatalog>,
    registry: DecoderRegistry,
    cache: PageCache,
    pages: InFlight<CacheKey, Bytes>,
    thumbnails: InFlight<ThumbnailKey, Bytes>,
    /// Limits decode+transcode jobs running at once
    extraction_limit: Semaphore,
    /// Producer and preload tasks
    tasks: TaskTracker,
    accepting_new: AtomicBool,
    counters: Counters,
}

/// Serves comic pages from the cache, decoding archives on demand
#[derive(Clone)]
pub struct PageService {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for PageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageService")
            .field("cache_root", &self.inner.cache.root())
            .field("pages_in_flight", &self.inner.pages.len())
            .field("background_tasks", &self.inner.tasks.len())
            .field("accepting_new", &self.is_accepting())
            .finish()
    }
}

impl PageService {
    /// Create a service with the ZIP, RAR, 7z and TAR decoders
    ///
    /// Workspaces left behind by a previous run are removed from the temp
    /// directory before the service accepts requests.
    pub async fn new(config: Config, catalog: Arc<dyn ComicCatalog>) -> Result<Self> {
        let registry = DecoderRegistry::with_default_decoders(
            config.temp_dir().clone(),
            config.extraction.image_extensions.clone(),
        );
        Self::with_registry(config, catalog, registry).await
    }

    /// Create a service with a caller-supplied decoder registry
    pub async fn with_registry(
        config: Config,
        catalog: Arc<dyn ComicCatalog>,
        registry: DecoderRegistry,
    ) -> Result<Self> {
        config.validate()?;

        let temp_dir = registry.temp_dir().to_path_buf();
        let swept =
            spawn_blocking(move || sweep_stale_workspaces(&temp_dir, STALE_WORKSPACE_AGE))
                .await
                .map_err(|e| Error::Other(format!("workspace sweep task panicked: {}", e)))??;
        if swept > 0 {
            info!(swept, "removed stale extraction workspaces");
        }

        let cache = PageCache::new(config.cache_root().clone());
        let extraction_limit = Semaphore::new(config.extraction.max_concurrent_extractions);

        info!(
            cache_root = ?cache.root(),
            temp_dir = ?registry.temp_dir(),
            max_concurrent_extractions = config.extraction.max_concurrent_extractions,
            "page service ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                catalog,
                registry,
                cache,
                pages: InFlight::new(),
                thumbnails: InFlight::new(),
                extraction_limit,
                tasks: TaskTracker::new(),
                accepting_new: AtomicBool::new(true),
                counters: Counters::default(),
            }),
        })
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The page cache
    pub fn cache(&self) -> &PageCache {
        &self.inner.cache
    }

    /// Snapshot of the request counters
    pub fn stats(&self) -> ServiceStats {
        self.inner.counters.snapshot()
    }

    /// Whether new requests are accepted
    pub fn is_accepting(&self) -> bool {
        self.inner.accepting_new.load(Ordering::SeqCst)
    }

    /// Producer and preload tasks still running
    pub fn background_tasks(&self) -> usize {
        self.inner.tasks.len()
    }

    /// Serve a page in the format negotiated from `accept`, with the
    /// configured preload
    pub async fn stream_page(
        &self,
        comic_id: ComicId,
        page: u32,
        accept: Option<&str>,
    ) -> Result<PageResponse> {
        self.get_page(ExtractionRequest::new(comic_id, page, accept))
            .await
    }

    /// Serve a page
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPage`] for page 0 or a page past the declared or
    ///   real page count
    /// - [`Error::ComicNotFound`] when the catalog cannot resolve the comic
    /// - extraction and transcode errors from the decode
    ///
    /// A page that decodes but cannot be written to the cache is still
    /// returned.
    pub async fn get_page(&self, request: ExtractionRequest) -> Result<PageResponse> {
        self.ensure_accepting()?;

        let ExtractionRequest {
            comic_id,
            page,
            format,
            preload_count,
        } = request;

        if page == 0 {
            return Err(Error::InvalidPage {
                comic_id,
                page,
                page_count: None,
            });
        }

        let file = self.inner.catalog.get_comic_file(comic_id).await?;
        if let Some(page_count) = file.declared_page_count.filter(|count| page > *count) {
            return Err(Error::InvalidPage {
                comic_id,
                page,
                page_count: Some(page_count),
            });
        }

        let key = CacheKey::new(comic_id, page, format);
        if let Some(bytes) = self.cached_bytes(&key).await {
            Counters::bump(&self.inner.counters.cache_hits);
            debug!(key = %key, "page cache hit");
            return Ok(self.response(bytes, format, true));
        }
        Counters::bump(&self.inner.counters.cache_misses);

        let archive = archive_handle(file).await?;
        let preload = effective_preload(preload_count, &self.inner.config.extraction);
        let strategy = DecodeStrategy::for_archive(
            archive.size_bytes,
            self.inner.config.extraction.large_file_threshold_bytes,
        );
        debug!(key = %key, ?strategy, preload, "page cache miss");

        let service = self.clone();
        let producer_archive = archive.clone();
        let (result, leader) = self
            .inner
            .pages
            .join_or_start(key, move |guard| {
                let tasks = service.inner.tasks.clone();
                tasks.spawn(async move {
                    service
                        .extract_requested(guard, producer_archive, strategy, preload)
                        .await;
                });
            })
            .await;

        let bytes = match result {
            Some(result) => result.map_err(unshare)?,
            None => {
                return Err(Error::Other(format!(
                    "extraction of page {} ended without a result",
                    key
                )));
            }
        };

        // A ranged decode already covered the preload window
        if leader && strategy == DecodeStrategy::SinglePage {
            self.schedule_preload(key, archive, preload);
        }

        Ok(self.response(bytes, format, false))
    }

    /// Number of pages in a comic's archive
    pub async fn page_count(&self, comic_id: ComicId) -> Result<u32> {
        self.ensure_accepting()?;
        let file = self.inner.catalog.get_comic_file(comic_id).await?;
        self.inner.registry.page_count(&file.path).await
    }

    /// Serve the cover thumbnail of a comic
    ///
    /// Rendered from page 1 to fit the configured box and cached under the
    /// thumbnails directory.
    pub async fn thumbnail(&self, comic_id: ComicId) -> Result<PageResponse> {
        self.ensure_accepting()?;

        let file = self.inner.catalog.get_comic_file(comic_id).await?;
        let format = self.inner.config.thumbnails.format;

        if let Some(path) = self.inner.cache.lookup_thumbnail(comic_id, format).await {
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    Counters::bump(&self.inner.counters.cache_hits);
                    return Ok(self.response(Bytes::from(bytes), format, true));
                }
                Err(e) => warn!(?path, error = %e, "cached thumbnail unreadable, regenerating"),
            }
        }

        let archive = archive_handle(file).await?;
        let service = self.clone();
        let (result, _) = self
            .inner
            .thumbnails
            .join_or_start((comic_id, format), move |guard| {
                let tasks = service.inner.tasks.clone();
                tasks.spawn(async move {
                    service.render_thumbnail(guard, archive).await;
                });
            })
            .await;

        match result {
            Some(result) => Ok(self.response(result.map_err(unshare)?, format, false)),
            None => Err(Error::Other(format!(
                "thumbnail of comic {} ended without a result",
                comic_id
            ))),
        }
    }

    /// Remove every cached page and thumbnail of a comic
    pub async fn purge_comic(&self, comic_id: ComicId) -> Result<u64> {
        self.inner.cache.purge_comic(comic_id).await
    }

    /// Totals for the cache directory
    pub async fn cache_usage(&self) -> Result<CacheUsage> {
        self.inner.cache.usage().await
    }

    /// Stop accepting requests and wait for background work to finish
    ///
    /// In-flight decodes and preloads run to completion (bounded by a
    /// timeout) so no partial work is abandoned mid-write.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Initiating page service shutdown");

        self.inner.accepting_new.store(false, Ordering::SeqCst);
        self.inner.tasks.close();

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.inner.tasks.wait()).await {
            Ok(()) => info!("All background extractions finished"),
            Err(_) => warn!(
                remaining = self.inner.tasks.len(),
                "Timeout waiting for background extractions, proceeding with shutdown"
            ),
        }

        info!("Page service shutdown complete");
        Ok(())
    }

    fn ensure_accepting(&self) -> Result<()> {
        if self.is_accepting() {
            Ok(())
        } else {
            Err(Error::ShuttingDown)
        }
    }

    fn response(&self, bytes: Bytes, format: OutputFormat, from_cache: bool) -> PageResponse {
        PageResponse {
            bytes,
            format,
            cache_control: self.inner.config.server.cache_control.clone(),
            from_cache,
        }
    }

    async fn cached_bytes(&self, key: &CacheKey) -> Option<Bytes> {
        let cached = self.inner.cache.lookup(key).await?;
        match self.inner.cache.read(&cached).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(key = %key, error = %e, "cached page unreadable, regenerating");
                None
            }
        }
    }

    /// Producer for a requested page: the page alone, or the page plus its
    /// preload window for large archives
    async fn extract_requested(
        &self,
        guard: PageGuard,
        archive: ArchiveHandle,
        strategy: DecodeStrategy,
        preload: u32,
    ) {
        let key = *guard.key();
        let mut guards = vec![guard];
        if strategy == DecodeStrategy::Ranged {
            guards.extend(
                self.claim_following(key, preload, archive.declared_page_count)
                    .await,
            );
        }
        self.produce(archive, key.format, guards).await;
    }

    /// Warm the pages after `key` without blocking the caller
    ///
    /// Pages already cached or being produced elsewhere are skipped.
    /// Failures are logged and never reach the original request.
    fn schedule_preload(&self, key: CacheKey, archive: ArchiveHandle, preload: u32) {
        if !self.is_accepting()
            || following_pages(key.page, preload, archive.declared_page_count).is_none()
        {
            return;
        }

        Counters::bump(&self.inner.counters.preloads_scheduled);
        let service = self.clone();
        self.inner.tasks.spawn(async move {
            let guards = service
                .claim_following(key, preload, archive.declared_page_count)
                .await;
            if guards.is_empty() {
                debug!(key = %key, "preload window already cached or in flight");
                return;
            }

            let flights: Vec<(u32, Flight<Bytes>)> = guards
                .iter()
                .map(|guard| (guard.key().page, guard.subscribe()))
                .collect();
            debug!(key = %key, pages = flights.len(), "preloading pages");

            service.produce(archive, key.format, guards).await;

            let outcomes = join_all(
                flights
                    .into_iter()
                    .map(|(page, flight)| async move { (page, flight.wait().await) }),
            )
            .await;
            for (page, outcome) in outcomes {
                match outcome {
                    Some(Err(e)) if matches!(e.root(), Error::InvalidPage { .. }) => {
                        debug!(comic_id = %key.comic_id, page, "preload window ran past the last page");
                    }
                    Some(Err(e)) => {
                        Counters::bump(&service.inner.counters.preload_failures);
                        warn!(comic_id = %key.comic_id, page, error = %e, "preload failed");
                    }
                    _ => {}
                }
            }
        });
    }

    /// Claim the uncached pages of the preload window after `key`
    async fn claim_following(
        &self,
        key: CacheKey,
        preload: u32,
        declared_page_count: Option<u32>,
    ) -> Vec<PageGuard> {
        let Some(window) = following_pages(key.page, preload, declared_page_count) else {
            return Vec::new();
        };

        let mut guards = Vec::new();
        for page in window.start..=window.end {
            let next = key.with_page(page);
            if self.inner.cache.lookup(&next).await.is_some() {
                continue;
            }
            if let Some(guard) = self.inner.pages.try_claim(next) {
                guards.push(guard);
            }
        }
        guards
    }

    /// Decode, transcode and cache the pages owned by `guards` in one pass
    ///
    /// Every guard is completed: with the page bytes, with the shared
    /// decode error, or with [`Error::InvalidPage`] when the archive turned
    /// out to be shorter than the page.
    async fn produce(&self, archive: ArchiveHandle, format: OutputFormat, guards: Vec<PageGuard>) {
        // Another producer may have stored some of these since they were claimed
        let mut pending = Vec::with_capacity(guards.len());
        for guard in guards {
            match self.cached_bytes(guard.key()).await {
                Some(bytes) => guard.complete(Ok(bytes)),
                None => pending.push(guard),
            }
        }

        let pages = pending.iter().map(|guard| guard.key().page);
        let (Some(first), Some(last)) = (pages.clone().min(), pages.max()) else {
            return;
        };

        let permit = match self.inner.extraction_limit.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                fail_all(pending, Error::ShuttingDown);
                return;
            }
        };

        Counters::bump(&self.inner.counters.decodes);
        let decoded = match self
            .inner
            .registry
            .decode(&archive, Some(PageRange::new(first, last)))
            .await
        {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(path = ?archive.path, first, last, error = %e, "failed to decode archive");
                fail_all(pending, e);
                return;
            }
        };
        Counters::add(
            &self.inner.counters.pages_extracted,
            decoded.images.len() as u64,
        );

        let page_count = decoded.page_count;
        let mut images: HashMap<u32, RawImage> = decoded
            .images
            .into_iter()
            .map(|image| (image.page, image))
            .collect();

        let mut jobs = Vec::with_capacity(pending.len());
        for guard in pending {
            let key = *guard.key();
            match images.remove(&key.page) {
                Some(image) => jobs.push((guard, image)),
                None => guard.complete(Err(Arc::new(Error::InvalidPage {
                    comic_id: key.comic_id,
                    page: key.page,
                    page_count: Some(page_count),
                }))),
            }
        }
        if jobs.is_empty() {
            return;
        }

        Counters::add(&self.inner.counters.transcodes, jobs.len() as u64);
        let transcoded = spawn_blocking(move || {
            jobs.into_iter()
                .map(|(guard, image)| {
                    let result = ImageTranscoder::transcode(&image, format);
                    (guard, image.name, result)
                })
                .collect::<Vec<_>>()
        })
        .await;
        drop(permit);

        let transcoded = match transcoded {
            Ok(transcoded) => transcoded,
            Err(e) => {
                // The guards went down with the task and released their keys
                warn!(path = ?archive.path, error = %e, "transcode task panicked");
                return;
            }
        };

        for (guard, member, result) in transcoded {
            let key = *guard.key();
            match result {
                Ok(encoded) => {
                    let bytes = Bytes::from(encoded);
                    if let Err(e) = self.inner.cache.store(&key, bytes.clone()).await {
                        Counters::bump(&self.inner.counters.cache_write_failures);
                        warn!(key = %key, error = %e, "failed to cache page, serving it uncached");
                    }
                    guard.complete(Ok(bytes));
                }
                Err(e) => {
                    warn!(key = %key, member = %member, error = %e, "failed to transcode page");
                    guard.complete(Err(Arc::new(e)));
                }
            }
        }
    }

    async fn render_thumbnail(&self, guard: FlightGuard<ThumbnailKey, Bytes>, archive: ArchiveHandle) {
        let (comic_id, format) = *guard.key();
        match self.thumbnail_bytes(&archive).await {
            Ok(bytes) => {
                if let Err(e) = self
                    .inner
                    .cache
                    .store_thumbnail(comic_id, format, bytes.clone())
                    .await
                {
                    Counters::bump(&self.inner.counters.cache_write_failures);
                    warn!(comic_id = %comic_id, error = %e, "failed to cache thumbnail");
                }
                guard.complete(Ok(bytes));
            }
            Err(e) => {
                warn!(comic_id = %comic_id, error = %e, "failed to render thumbnail");
                guard.complete(Err(Arc::new(e)));
            }
        }
    }

    async fn thumbnail_bytes(&self, archive: &ArchiveHandle) -> Result<Bytes> {
        let _permit = self
            .inner
            .extraction_limit
            .acquire()
            .await
            .map_err(|_| Error::ShuttingDown)?;

        Counters::bump(&self.inner.counters.decodes);
        let decoded = self
            .inner
            .registry
            .decode(archive, Some(PageRange::single(1)))
            .await?;
        Counters::add(
            &self.inner.counters.pages_extracted,
            decoded.images.len() as u64,
        );

        let cover = decoded.images.into_iter().next().ok_or_else(|| {
            Error::Extraction(ExtractionError::NoImagesFound {
                archive: archive.path.clone(),
            })
        })?;

        Counters::bump(&self.inner.counters.transcodes);
        let config = self.inner.config.thumbnails.clone();
        let encoded = spawn_blocking(move || ImageTranscoder::thumbnail(&cover, &config))
            .await
            .map_err(|e| Error::Other(format!("thumbnail task panicked: {}", e)))??;
        Ok(Bytes::from(encoded))
    }
}

async fn archive_handle(file: ComicFile) -> Result<ArchiveHandle> {
    let size_bytes = tokio::fs::metadata(&file.path).await?.len();
    Ok(ArchiveHandle {
        path: file.path,
        size_bytes,
        declared_page_count: file.declared_page_count,
    })
}

fn fail_all(guards: Vec<PageGuard>, error: Error) {
    let error = Arc::new(error);
    for guard in guards {
        guard.complete(Err(Arc::clone(&error)));
    }
}

/// Take back sole ownership of a flight error when no other waiter holds it
fn unshare(error: Arc<Error>) -> Error {
    Arc::try_unwrap(error).unwrap_or_else(Error::Shared)
}
