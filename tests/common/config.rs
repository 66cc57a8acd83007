//! Test configuration helpers for building page services over temp directories

use comicshelf::{ComicCatalog, Config, PageService};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Config whose cache and workspaces live under `temp`
pub fn test_config(temp: &TempDir) -> Config {
    let mut config = Config::default();
    config.cache.cache_root = temp.path().join("cache");
    config.cache.temp_dir = temp.path().join("work");
    config
}

/// Create a page service over `catalog`, panicking on invalid config
pub async fn create_service(config: Config, catalog: Arc<dyn ComicCatalog>) -> PageService {
    PageService::new(config, catalog)
        .await
        .expect("page service should start")
}

/// Wait until no producer or preload task is running
pub async fn settle(service: &PageService) {
    for _ in 0..1000 {
        if service.background_tasks() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("background tasks did not finish within 10s");
}
