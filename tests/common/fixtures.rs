//! Comic archive fixtures built from generated page images

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;

/// Width of generated pages
pub const PAGE_WIDTH: u32 = 24;

/// Height of generated pages
pub const PAGE_HEIGHT: u32 = 36;

/// Encode a solid-color page image; `seed` varies the color per page
pub fn page_image(seed: u8, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_pixel(PAGE_WIDTH, PAGE_HEIGHT, Rgb([seed, 128, 255 - seed]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, format)
        .expect("encode page image");
    out.into_inner()
}

/// `count` PNG pages named `page1.png`, `page2.png`, ...
///
/// Only a natural sort puts `page10.png` after `page9.png`.
pub fn comic_pages(count: usize) -> Vec<(String, Vec<u8>)> {
    (1..=count)
        .map(|i| (format!("page{}.png", i), page_image(i as u8, ImageFormat::Png)))
        .collect()
}

/// Write a CBZ (ZIP) archive
pub fn write_cbz(path: &Path, pages: &[(String, Vec<u8>)]) {
    let file = std::fs::File::create(path).expect("create cbz");
    let mut writer = zip::ZipWriter::new(file);
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, content) in pages {
        writer.start_file(name.as_str(), options).expect("start zip entry");
        std::io::Write::write_all(&mut writer, content).expect("write zip entry");
    }
    writer.finish().expect("finish cbz");
}

/// Write a CB7 (7z) archive via a staging directory
pub fn write_cb7(path: &Path, pages: &[(String, Vec<u8>)]) {
    let staging = TempDir::new().expect("staging dir");
    for (name, content) in pages {
        std::fs::write(staging.path().join(name), content).expect("stage page");
    }
    sevenz_rust::compress_to_path(staging.path(), path).expect("compress cb7");
}

/// Write a CBT (ustar) archive
pub fn write_cbt(path: &Path, pages: &[(String, Vec<u8>)]) {
    let file = std::fs::File::create(path).expect("create cbt");
    let mut builder = tar::Builder::new(file);
    for (name, content) in pages {
        let mut header = tar::Header::new_ustar();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder
            .append_data(&mut header, name, content.as_slice())
            .expect("append tar entry");
    }
    builder.finish().expect("finish cbt");
}
