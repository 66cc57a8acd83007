//! Custom test assertions for page pipeline tests

use comicshelf::{CacheKey, ComicId, OutputFormat, PageResponse, PageService};
use image::GenericImageView;

/// Assert that `page` decodes as `format` with the given dimensions
pub fn assert_page_image(page: &PageResponse, format: OutputFormat, width: u32, height: u32) {
    assert_eq!(page.format, format, "unexpected output format");
    let guessed = image::guess_format(&page.bytes).expect("page bytes should be an image");
    assert_eq!(guessed, format.image_format(), "bytes do not match the declared format");

    let decoded = image::load_from_memory(&page.bytes).expect("page bytes should decode");
    assert_eq!(decoded.dimensions(), (width, height));
}

/// Pages of `comic_id` cached in `format`, in ascending order
pub async fn cached_pages(
    service: &PageService,
    comic_id: ComicId,
    format: OutputFormat,
    up_to: u32,
) -> Vec<u32> {
    let mut cached = Vec::new();
    for page in 1..=up_to {
        let key = CacheKey::new(comic_id, page, format);
        if service.cache().lookup(&key).await.is_some() {
            cached.push(page);
        }
    }
    cached
}
