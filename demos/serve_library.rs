//! Comic library server example
//!
//! Serves the comics of a SQLite catalog over HTTP. Pass the catalog path
//! as the first argument; without one, an in-memory catalog is seeded from
//! the `.cbz`/`.cbr`/`.cb7`/`.cbt` files in the current directory.
//!
//! After starting, you can:
//! - Read a page via GET http://localhost:8090/comics/1/pages/1
//! - Fetch a cover via GET http://localhost:8090/comics/1/thumbnail
//! - Inspect counters via GET http://localhost:8090/stats

use comicshelf::api::start_api_server;
use comicshelf::{
    ComicCatalog, ComicId, Config, MemoryCatalog, PageService, SqliteCatalog,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const COMIC_EXTENSIONS: [&str; 4] = ["cbz", "cbr", "cb7", "cbt"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::var("COMICSHELF_CONFIG") {
        Ok(path) => Config::from_json_file(Path::new(&path))?,
        Err(_) => Config::default(),
    };

    let catalog: Arc<dyn ComicCatalog> = match std::env::args().nth(1) {
        Some(db_path) => Arc::new(SqliteCatalog::open(Path::new(&db_path)).await?),
        None => Arc::new(scan_current_dir().await?),
    };

    let service = PageService::new(config.clone(), catalog).await?;
    let bind_address = config.server.bind_address;

    println!("Serving comics on http://{}", bind_address);
    println!("  curl -H 'Accept: image/webp' http://{}/comics/1/pages/1 -o page1.webp", bind_address);
    println!("  curl http://{}/comics/1/page-count", bind_address);

    start_api_server(
        service.clone(),
        Arc::new(config),
        comicshelf::wait_for_signal(),
    )
    .await?;

    // Let running decodes and preloads finish before exiting
    service.shutdown().await?;
    Ok(())
}

/// Number the comic archives in the working directory from 1, sorted by name
async fn scan_current_dir() -> std::io::Result<MemoryCatalog> {
    let mut archives: Vec<PathBuf> = std::fs::read_dir(".")?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| COMIC_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    archives.sort();

    let catalog = MemoryCatalog::new();
    for (i, path) in archives.into_iter().enumerate() {
        println!("  comic {} -> {}", i + 1, path.display());
        catalog.insert(ComicId(i as i64 + 1), path, None).await;
    }
    Ok(catalog)
}
