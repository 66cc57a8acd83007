use crate::error::{Error, ExtractionError};
use crate::extraction::shared::{select_pages, workspace_file_name};
use crate::extraction::*;
use crate::types::{ArchiveHandle, ArchiveType, PageRange};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn image_extensions() -> Vec<String> {
    crate::config::ExtractionConfig::default().image_extensions
}

fn registry(temp: &Path) -> DecoderRegistry {
    DecoderRegistry::with_default_decoders(temp.join("work"), image_extensions())
}

fn handle(path: &Path) -> ArchiveHandle {
    ArchiveHandle {
        path: path.to_path_buf(),
        size_bytes: std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
        declared_page_count: None,
    }
}

/// Create a ZIP archive containing the given members
fn create_zip_archive(archive_path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options =
        ::zip::write::FileOptions::default().compression_method(::zip::CompressionMethod::Stored);
    for (name, content) in files {
        writer.start_file(*name, options).unwrap();
        std::io::Write::write_all(&mut writer, content).unwrap();
    }
    writer.finish().unwrap();
}

/// Create a 7z archive from the given members via a staging directory
fn create_7z_archive(archive_path: &Path, files: &[(&str, &[u8])]) {
    let staging = TempDir::new().unwrap();
    for (name, content) in files {
        let path = staging.path().join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
    sevenz_rust::compress_to_path(staging.path(), archive_path).unwrap();
}

/// Create a ustar archive containing the given members
fn create_tar_archive(archive_path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let mut builder = ::tar::Builder::new(file);
    for (name, content) in files {
        let mut header = ::tar::Header::new_ustar();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(::tar::EntryType::Regular);
        header.set_cksum();
        builder.append_data(&mut header, name, *content).unwrap();
    }
    builder.finish().unwrap();
}

fn page_names(images: &[crate::types::RawImage]) -> Vec<&str> {
    images.iter().map(|image| image.name.as_str()).collect()
}

// ---------------------------------------------------------------------------
// Archive type detection
// ---------------------------------------------------------------------------

#[test]
fn test_detect_archive_type_by_extension() {
    assert_eq!(
        detect_archive_type(Path::new("a.cbz")),
        Some(ArchiveType::Zip)
    );
    assert_eq!(
        detect_archive_type(Path::new("a.CBR")),
        Some(ArchiveType::Rar)
    );
    assert_eq!(
        detect_archive_type(Path::new("a.cb7")),
        Some(ArchiveType::SevenZip)
    );
    assert_eq!(
        detect_archive_type(Path::new("a.cbt")),
        Some(ArchiveType::Tar)
    );
    assert_eq!(detect_archive_type(Path::new("a.7z")), Some(ArchiveType::SevenZip));
    assert_eq!(detect_archive_type(Path::new("a.pdf")), None);
    assert_eq!(detect_archive_type(Path::new("noext")), None);
}

#[test]
fn test_sniff_archive_type_from_magic_bytes() {
    assert_eq!(
        sniff_archive_type(b"PK\x03\x04rest"),
        Some(ArchiveType::Zip)
    );
    assert_eq!(
        sniff_archive_type(b"Rar!\x1a\x07\x01\x00"),
        Some(ArchiveType::Rar)
    );
    assert_eq!(
        sniff_archive_type(b"7z\xbc\xaf\x27\x1c\x00\x04"),
        Some(ArchiveType::SevenZip)
    );

    let mut tar_header = vec![0u8; 512];
    tar_header[257..262].copy_from_slice(b"ustar");
    assert_eq!(sniff_archive_type(&tar_header), Some(ArchiveType::Tar));

    assert_eq!(sniff_archive_type(b"%PDF-1.7"), None);
    assert_eq!(sniff_archive_type(b""), None);
}

#[test]
fn test_magic_bytes_override_wrong_extension() {
    let temp = TempDir::new().unwrap();
    // A ZIP file mislabelled as a RAR
    let path = temp.path().join("mislabelled.cbr");
    create_zip_archive(&path, &[("001.jpg", b"one")]);

    assert_eq!(resolve_archive_type(&path), Some(ArchiveType::Zip));
}

#[test]
fn test_resolve_falls_back_to_extension() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("odd.cbz");
    std::fs::write(&path, b"not really an archive").unwrap();
    assert_eq!(resolve_archive_type(&path), Some(ArchiveType::Zip));

    let unknown = temp.path().join("notes.txt");
    std::fs::write(&unknown, b"hello").unwrap();
    assert_eq!(resolve_archive_type(&unknown), None);
}

// ---------------------------------------------------------------------------
// Natural sort and page filtering
// ---------------------------------------------------------------------------

#[test]
fn test_natural_cmp_orders_numbers_by_value() {
    let mut names = vec!["page1.jpg", "page2.jpg", "page10.jpg", "page9.jpg"];
    names.sort_by(|a, b| natural_cmp(a, b));
    assert_eq!(names, vec!["page1.jpg", "page2.jpg", "page9.jpg", "page10.jpg"]);
}

#[test]
fn test_natural_cmp_edge_cases() {
    assert_eq!(natural_cmp("Page2.jpg", "page10.jpg"), Ordering::Less);
    assert_eq!(natural_cmp("ch2/p1.jpg", "ch10/p1.jpg"), Ordering::Less);
    assert_eq!(natural_cmp("a.jpg", "a.jpg"), Ordering::Equal);
    // Zero padding does not change the numeric value
    assert_eq!(natural_cmp("p007.jpg", "p8.jpg"), Ordering::Less);
    assert_ne!(natural_cmp("p007.jpg", "p7.jpg"), Ordering::Equal);
    // Digit runs longer than u64 must not overflow
    assert_eq!(
        natural_cmp("p99999999999999999999999.jpg", "p100000000000000000000000.jpg"),
        Ordering::Less
    );
    assert_eq!(natural_cmp("p1", "p1a"), Ordering::Less);
}

#[test]
fn test_is_page_image_filters_members() {
    let exts = image_extensions();
    assert!(is_page_image("001.jpg", &exts));
    assert!(is_page_image("Chapter 1/002.PNG", &exts));
    assert!(is_page_image("cover.webp", &exts));
    assert!(!is_page_image("ComicInfo.xml", &exts));
    assert!(!is_page_image("__MACOSX/._001.jpg", &exts));
    assert!(!is_page_image("pages/.hidden.jpg", &exts));
    assert!(!is_page_image("folder.jpg/", &exts));
    assert!(!is_page_image("README", &exts));
}

#[test]
fn test_order_pages_and_select_range() {
    let members = vec![
        "page10.jpg".to_string(),
        "ComicInfo.xml".to_string(),
        "page2.jpg".to_string(),
        "page1.jpg".to_string(),
        "page9.jpg".to_string(),
    ];
    let pages = order_pages(members, &image_extensions());
    assert_eq!(pages, vec!["page1.jpg", "page2.jpg", "page9.jpg", "page10.jpg"]);

    let selected = select_pages(&pages, Some(PageRange::new(2, 3)));
    assert_eq!(
        selected,
        vec![(2, "page2.jpg".to_string()), (3, "page9.jpg".to_string())]
    );
    assert_eq!(select_pages(&pages, None).len(), 4);
    assert!(select_pages(&pages, Some(PageRange::single(9))).is_empty());
}

#[test]
fn test_workspace_file_name_ignores_member_path() {
    assert_eq!(workspace_file_name(3, "../../etc/passwd.jpg"), "00003.jpg");
    assert_eq!(workspace_file_name(12, "dir/Page.PNG"), "00012.png");
    assert_eq!(workspace_file_name(1, "noext"), "00001.bin");
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_zip_decode_natural_order() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("comic.cbz");
    create_zip_archive(
        &archive,
        &[
            ("page1.jpg", b"p1"),
            ("page2.jpg", b"p2"),
            ("page10.jpg", b"p10"),
            ("page9.jpg", b"p9"),
            ("ComicInfo.xml", b"<ComicInfo/>"),
        ],
    );

    let decoded = registry(temp.path())
        .decode(&handle(&archive), None)
        .await
        .unwrap();

    assert_eq!(decoded.page_count, 4);
    assert_eq!(
        page_names(&decoded.images),
        vec!["page1.jpg", "page2.jpg", "page9.jpg", "page10.jpg"]
    );
    assert_eq!(decoded.images[3].page, 4);
    assert_eq!(decoded.images[3].bytes, b"p10");
}

#[tokio::test]
async fn test_zip_ranged_decode_returns_requested_pages() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("comic.cbz");
    let names: Vec<String> = (1..=12).map(|i| format!("{:03}.jpg", i)).collect();
    let files: Vec<(&str, &[u8])> = names.iter().map(|n| (n.as_str(), n.as_bytes())).collect();
    create_zip_archive(&archive, &files);

    let decoded = registry(temp.path())
        .decode(&handle(&archive), Some(PageRange::new(10, 15)))
        .await
        .unwrap();

    assert_eq!(decoded.page_count, 12);
    let pages: Vec<u32> = decoded.images.iter().map(|i| i.page).collect();
    assert_eq!(pages, vec![10, 11, 12]);
    assert_eq!(decoded.images[0].bytes, b"010.jpg");
}

#[tokio::test]
async fn test_range_past_end_yields_no_images() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("comic.cbz");
    create_zip_archive(&archive, &[("1.png", b"a"), ("2.png", b"b")]);

    let decoded = registry(temp.path())
        .decode(&handle(&archive), Some(PageRange::single(3)))
        .await
        .unwrap();
    assert_eq!(decoded.page_count, 2);
    assert!(decoded.images.is_empty());
}

#[tokio::test]
async fn test_sevenz_decode() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("comic.cb7");
    create_7z_archive(
        &archive,
        &[
            ("pages/p10.png", b"ten"),
            ("pages/p2.png", b"two"),
            ("pages/p1.png", b"one"),
            ("notes.txt", b"skip me"),
        ],
    );

    let decoded = registry(temp.path())
        .decode(&handle(&archive), Some(PageRange::new(2, 3)))
        .await
        .unwrap();

    assert_eq!(decoded.page_count, 3);
    assert_eq!(page_names(&decoded.images), vec!["pages/p2.png", "pages/p10.png"]);
    assert_eq!(decoded.images[1].bytes, b"ten");
}

#[tokio::test]
async fn test_tar_decode() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("comic.cbt");
    create_tar_archive(
        &archive,
        &[("b/2.gif", b"g2"), ("b/1.gif", b"g1"), (".DS_Store.gif", b"x")],
    );

    let registry = registry(temp.path());
    assert_eq!(registry.page_count(&archive).await.unwrap(), 2);

    let decoded = registry.decode(&handle(&archive), None).await.unwrap();
    assert_eq!(page_names(&decoded.images), vec!["b/1.gif", "b/2.gif"]);
    assert_eq!(decoded.images[0].bytes, b"g1");
}

#[tokio::test]
async fn test_no_images_found() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("text.cbz");
    create_zip_archive(&archive, &[("readme.txt", b"hello")]);

    let err = registry(temp.path())
        .decode(&handle(&archive), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Extraction(ExtractionError::NoImagesFound { .. })
    ));
}

#[tokio::test]
async fn test_unsupported_format() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("book.pdf");
    std::fs::write(&archive, b"%PDF-1.7 not an archive").unwrap();

    let err = registry(temp.path())
        .decode(&handle(&archive), None)
        .await
        .unwrap_err();
    match err {
        Error::Extraction(ExtractionError::UnsupportedFormat { archive: reported }) => {
            assert_eq!(reported, archive)
        }
        other => panic!("expected UnsupportedFormat, got {:?}", other),
    }
}

#[tokio::test]
async fn test_corrupt_archive() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("broken.cbz");
    std::fs::write(&archive, b"PK\x03\x04 truncated garbage").unwrap();

    let err = registry(temp.path())
        .decode(&handle(&archive), None)
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::Extraction(ExtractionError::CorruptArchive { .. })),
        "got {:?}",
        err
    );
}

#[tokio::test]
async fn test_workspaces_are_removed_after_decode() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("comic.cbz");
    create_zip_archive(&archive, &[("1.jpg", b"a"), ("2.jpg", b"b")]);

    let registry = registry(temp.path());
    registry.decode(&handle(&archive), None).await.unwrap();

    let leftovers: Vec<PathBuf> = std::fs::read_dir(registry.temp_dir())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert!(leftovers.is_empty(), "leftover workspaces: {:?}", leftovers);
}

#[tokio::test]
async fn test_missing_decoder_is_unsupported() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("comic.cbz");
    create_zip_archive(&archive, &[("1.jpg", b"a")]);

    let empty = DecoderRegistry::new(temp.path().join("work"), image_extensions());
    assert!(empty.decoder_for(ArchiveType::Zip).is_none());
    let err = empty.decode(&handle(&archive), None).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Extraction(ExtractionError::UnsupportedFormat { .. })
    ));
}

// ---------------------------------------------------------------------------
// RAR (committed fixture, regenerated by tests/fixtures/make_cbr.py)
// ---------------------------------------------------------------------------

/// Ten stored PNG pages in scrambled archive order plus `ComicInfo.xml`
fn rar_fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/pages.cbr")
}

/// Pixel color of page `n` in the RAR fixture
fn rar_page_color(n: u8) -> [u8; 3] {
    [n * 20, 128, 255 - n * 20]
}

#[test]
fn test_rar_lists_members() {
    let members = RarExtractor.list_members(&rar_fixture()).unwrap();
    assert_eq!(members.len(), 11);
    assert_eq!(members[0], "page10.png");
    assert!(members.contains(&"ComicInfo.xml".to_string()));
}

#[tokio::test]
async fn test_rar_decode_natural_order() {
    let temp = TempDir::new().unwrap();
    let registry = registry(temp.path());
    let archive = rar_fixture();

    assert_eq!(registry.page_count(&archive).await.unwrap(), 10);

    let decoded = registry.decode(&handle(&archive), None).await.unwrap();
    assert_eq!(decoded.page_count, 10);
    let expected: Vec<String> = (1..=10).map(|n| format!("page{}.png", n)).collect();
    assert_eq!(page_names(&decoded.images), expected);

    let last = image::load_from_memory(&decoded.images[9].bytes)
        .unwrap()
        .to_rgb8();
    assert_eq!(last.get_pixel(0, 0).0, rar_page_color(10));
}

#[tokio::test]
async fn test_rar_ranged_decode_of_middle_page() {
    let temp = TempDir::new().unwrap();
    let registry = registry(temp.path());

    let decoded = registry
        .decode(&handle(&rar_fixture()), Some(PageRange::single(5)))
        .await
        .unwrap();

    assert_eq!(decoded.page_count, 10);
    assert_eq!(decoded.images.len(), 1);
    assert_eq!(decoded.images[0].page, 5);
    assert_eq!(decoded.images[0].name, "page5.png");

    let page = image::load_from_memory(&decoded.images[0].bytes)
        .unwrap()
        .to_rgb8();
    assert_eq!(page.dimensions(), (4, 6));
    assert_eq!(page.get_pixel(3, 5).0, rar_page_color(5));

    let leftovers = std::fs::read_dir(registry.temp_dir()).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_corrupt_rar() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("broken.cbr");
    std::fs::write(&archive, b"Rar!\x1a\x07\xff\xfe garbage after the marker").unwrap();

    let err = RarExtractor.list_members(&archive).unwrap_err();
    assert!(
        matches!(err, Error::Extraction(ExtractionError::CorruptArchive { .. })),
        "got {:?}",
        err
    );

    let err = registry(temp.path())
        .decode(&handle(&archive), Some(PageRange::single(1)))
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::Extraction(ExtractionError::CorruptArchive { .. })),
        "got {:?}",
        err
    );
}
