use super::*;
use crate::catalog::MemoryCatalog;
use crate::types::ComicId;
use axum::body::Body;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::Response;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;


/// Router over an in-memory catalog rooted in a temp directory
struct TestApp {
    temp: TempDir,
    catalog: Arc<MemoryCatalog>,
    service: PageService,
    config: Arc<Config>,
}

impl TestApp {
    async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    async fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.cache.cache_root = temp.path().join("cache");
        config.cache.temp_dir = temp.path().join("work");
        config.extraction.preload_count = 0;
        adjust(&mut config);

        let catalog = Arc::new(MemoryCatalog::new());
        let service = PageService::new(config.clone(), catalog.clone())
            .await
            .unwrap();
        Self {
            temp,
            catalog,
            service,
            config: Arc::new(config),
        }
    }

    fn router(&self) -> Router {
        create_router(self.service.clone(), self.config.clone())
    }

    async fn add_comic(&self, id: i64, page_sizes: &[(u32, u32)]) -> PathBuf {
        let path = self.temp.path().join(format!("comic-{}.cbz", id));
        write_comic(&path, page_sizes);
        self.catalog
            .insert(ComicId(id), path.clone(), Some(page_sizes.len() as u32))
            .await;
        path
    }

    async fn get(&self, uri: &str, accept: Option<&str>) -> Response {
        let mut builder = Request::builder().uri(uri);
        if let Some(accept) = accept {
            builder = builder.header("Accept", accept);
        }
        self.router()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }
}

fn write_comic(path: &Path, page_sizes: &[(u32, u32)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options =
        ::zip::write::FileOptions::default().compression_method(::zip::CompressionMethod::Stored);
    for (i, (width, height)) in page_sizes.iter().enumerate() {
        let img = RgbImage::from_pixel(*width, *height, Rgb([i as u8 * 20, 40, 200]));
        let mut png = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut png, ImageFormat::Png)
            .unwrap();
        writer
            .start_file(format!("{:03}.png", i + 1), options)
            .unwrap();
        std::io::Write::write_all(&mut writer, &png.into_inner()).unwrap();
    }
    writer.finish().unwrap();
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn header<'a>(response: &'a Response, name: &str) -> &'a str {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

#[tokio::test]
async fn test_api_server_spawns_and_stops() {
    let app = TestApp::with_config(|config| {
        // Port 0 = OS assigns a free port
        config.server.bind_address = "127.0.0.1:0".parse().unwrap();
    })
    .await;

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(start_api_server(
        app.service.clone(),
        app.config.clone(),
        async move {
            let _ = stop_rx.await;
        },
    ));

    tokio::time::sleep(Duration::from_millis(100)).await;
    stop_tx.send(()).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server should stop after shutdown signal")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_cors_enabled() {
    let app = TestApp::with_config(|config| {
        config.server.cors_enabled = true;
        config.server.cors_origins = vec!["*".to_string()];
    })
    .await;

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.router().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin"),
        "CORS header should be present when CORS is enabled"
    );
}

#[tokio::test]
async fn test_cors_disabled() {
    let app = TestApp::with_config(|config| config.server.cors_enabled = false).await;

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.router().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = TestApp::new().await;
    let response = app.get("/comics/1/pages", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
