//! End-to-end runs of the batch pipeline against generated images.

use std::cell::RefCell;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use exif::experimental::Writer;
use exif::{Field, In, Rational, Tag, Value};
use image::{DynamicImage, GenericImageView, ImageFormat, RgbImage};
use photopress::{
    BatchConverter, ConversionOptions, GALLERY_FILENAME, ManifestStatus, ResizeOptions,
    detect_output_conflicts, read_gallery_data, resolve_effective_output_dir,
};

fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    }))
}

fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    gradient(width, height).save_with_format(&path, ImageFormat::Png).unwrap();
    path
}

/// JPEG with an APP1 EXIF segment inserted right after SOI
fn write_jpeg_with_exif(dir: &Path, name: &str) -> PathBuf {
    let mut jpeg = Vec::new();
    gradient(64, 48)
        .write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
        .unwrap();

    let fields = [
        Field {
            tag: Tag::Model,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![b"TestCam 5".to_vec()]),
        },
        Field {
            tag: Tag::ExposureTime,
            ifd_num: In::PRIMARY,
            value: Value::Rational(vec![Rational { num: 1, denom: 250 }]),
        },
        Field {
            tag: Tag::FNumber,
            ifd_num: In::PRIMARY,
            value: Value::Rational(vec![Rational { num: 28, denom: 10 }]),
        },
        Field {
            tag: Tag::FocalLength,
            ifd_num: In::PRIMARY,
            value: Value::Rational(vec![Rational { num: 50, denom: 1 }]),
        },
        Field {
            tag: Tag::PhotographicSensitivity,
            ifd_num: In::PRIMARY,
            value: Value::Short(vec![400]),
        },
    ];
    let mut writer = Writer::new();
    for field in &fields {
        writer.push_field(field);
    }
    let mut tiff = Cursor::new(Vec::new());
    writer.write(&mut tiff, false).unwrap();
    let tiff = tiff.into_inner();

    let mut app1 = vec![0xFF, 0xE1];
    app1.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
    app1.extend_from_slice(b"Exif\0\0");
    app1.extend_from_slice(&tiff);

    let mut bytes = jpeg[..2].to_vec();
    bytes.extend_from_slice(&app1);
    bytes.extend_from_slice(&jpeg[2..]);

    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

fn manifest_records(output_dir: &Path) -> Vec<photopress::ConvertedImageRecord> {
    match read_gallery_data(output_dir) {
        ManifestStatus::Loaded(records) => records,
        other => panic!("manifest not loaded: {}", other.describe()),
    }
}

#[test]
fn converts_batch_with_export_name_and_urls() {
    let input = tempfile::tempdir().unwrap();
    let base = tempfile::tempdir().unwrap();
    let files = vec![
        write_png(input.path(), "one.png", 40, 30),
        write_png(input.path(), "two.png", 30, 40),
        write_png(input.path(), "three.png", 10, 10),
    ];
    let output_dir = resolve_effective_output_dir(base.path());
    let options = ConversionOptions::new(files, output_dir.clone())
        .with_quality(75)
        .with_export_name(" portfolio ")
        .with_api_base_url("https://cdn.example.com/gallery/");

    let progress = RefCell::new(Vec::new());
    let on_progress = |current: usize, total: usize| progress.borrow_mut().push((current, total));
    let result = BatchConverter::new()
        .run(&options, Some(&on_progress), None)
        .unwrap();

    assert_eq!((result.total, result.succeeded, result.failed), (3, 3, 0));
    assert_eq!(*progress.borrow(), [(1, 3), (2, 3), (3, 3)]);
    assert_eq!(result.gallery_json_path, output_dir.join(GALLERY_FILENAME));
    assert!(result.input_total_bytes > 0);
    assert!(result.output_total_bytes > 0);

    let records = manifest_records(&output_dir);
    let names: Vec<_> = records.iter().map(|r| r.output_file.as_str()).collect();
    assert_eq!(names, ["portfolio-1.webp", "portfolio-2.webp", "portfolio-3.webp"]);
    assert_eq!(records[1].source_file, "two.png");
    assert_eq!(
        records[0].api_url.as_deref(),
        Some("https://cdn.example.com/gallery/portfolio-1.webp")
    );
    assert_eq!(records[1].metadata.get("image_width"), Some(&serde_json::json!(30)));
    assert_eq!(records[1].metadata.get("image_height"), Some(&serde_json::json!(40)));
    for name in names {
        assert!(output_dir.join(name).is_file());
    }
}

#[test]
fn corrupt_input_is_isolated() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let corrupt = input.path().join("corrupt.jpg");
    std::fs::write(&corrupt, b"\xFF\xD8 this is not really a jpeg").unwrap();
    let files = vec![
        write_png(input.path(), "a.png", 8, 8),
        corrupt,
        write_png(input.path(), "b.png", 8, 8),
        input.path().join("missing.png"),
    ];
    let options = ConversionOptions::new(files, output.path().to_path_buf());

    let logs = RefCell::new(Vec::new());
    let progress = RefCell::new(Vec::new());
    let on_log = |message: &str| logs.borrow_mut().push(message.to_string());
    let on_progress = |current: usize, _total: usize| progress.borrow_mut().push(current);
    let result = BatchConverter::new()
        .run(&options, Some(&on_progress), Some(&on_log))
        .unwrap();

    assert_eq!((result.total, result.succeeded, result.failed), (4, 2, 2));
    assert_eq!(result.succeeded + result.failed, result.total);
    assert_eq!(*progress.borrow(), [1, 2, 3, 4]);
    assert_eq!(result.errors.len(), 2);

    let logs = logs.borrow();
    assert!(logs.iter().any(|l| l.starts_with("Failed: corrupt.jpg (")));
    assert!(logs.iter().any(|l| l.starts_with("Failed: missing.png (")));
    assert_eq!(logs.first().map(String::as_str), Some("[1/4] Processing: a.png"));
    assert_eq!(
        logs.last().map(String::as_str),
        Some("Metadata file created: gallery-data.json")
    );

    let records = manifest_records(output.path());
    let names: Vec<_> = records.iter().map(|r| r.output_file.as_str()).collect();
    assert_eq!(names, ["a.webp", "b.webp"]);
}

#[test]
fn aspect_preserving_resize_keeps_source_dimensions_in_metadata() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let files = vec![write_png(input.path(), "wide.png", 200, 100)];
    let options = ConversionOptions::new(files, output.path().to_path_buf())
        .with_resize(ResizeOptions::fit(Some(100), None));

    let result = BatchConverter::new().run_silent(&options).unwrap();
    assert_eq!(result.succeeded, 1);

    let encoded = image::open(output.path().join("wide.webp")).unwrap();
    assert_eq!(encoded.dimensions(), (100, 50));

    let records = manifest_records(output.path());
    assert_eq!(records[0].metadata.get("image_width"), Some(&serde_json::json!(200)));
    assert_eq!(records[0].metadata.get("image_height"), Some(&serde_json::json!(100)));
}

#[test]
fn exact_resize_ignores_aspect_ratio() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let files = vec![write_png(input.path(), "square.png", 64, 64)];
    let options = ConversionOptions::new(files, output.path().to_path_buf())
        .with_resize(ResizeOptions::exact(Some(100), Some(50)));

    BatchConverter::new().run_silent(&options).unwrap();
    let encoded = image::open(output.path().join("square.webp")).unwrap();
    assert_eq!(encoded.dimensions(), (100, 50));
}

#[test]
fn invalid_resize_stops_run_before_any_work() {
    let input = tempfile::tempdir().unwrap();
    let base = tempfile::tempdir().unwrap();
    let output_dir = resolve_effective_output_dir(base.path());
    let files = vec![write_png(input.path(), "a.png", 8, 8)];
    let options = ConversionOptions::new(files, output_dir.clone())
        .with_resize(ResizeOptions::fit(Some(10), Some(10)));

    let err = BatchConverter::new().run_silent(&options).unwrap_err();
    assert!(err.to_string().contains("only width or only height"));
    assert!(!output_dir.exists());
}

#[test]
fn oversized_exact_resize_is_rejected_up_front() {
    let input = tempfile::tempdir().unwrap();
    let base = tempfile::tempdir().unwrap();
    let output_dir = resolve_effective_output_dir(base.path());
    let files = vec![
        write_png(input.path(), "a.png", 4, 4),
        write_png(input.path(), "b.png", 4, 4),
    ];
    let options = ConversionOptions::new(files, output_dir.clone())
        .with_resize(ResizeOptions::exact(Some(u32::MAX), Some(u32::MAX)));

    let err = BatchConverter::new().run_silent(&options).unwrap_err();
    assert!(err.to_string().contains("must be at most 16383 pixels"));
    assert!(!output_dir.exists());
}

#[test]
fn overwrite_mode_is_idempotent() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let files = vec![
        write_png(input.path(), "photo.png", 16, 16),
        write_png(input.path(), "other.png", 16, 16),
    ];
    let options = ConversionOptions::new(files, output.path().to_path_buf()).with_overwrite(true);
    let converter = BatchConverter::new();

    converter.run_silent(&options).unwrap();
    let first: Vec<_> = manifest_records(output.path()).into_iter().map(|r| r.output_file).collect();
    converter.run_silent(&options).unwrap();
    let second: Vec<_> = manifest_records(output.path()).into_iter().map(|r| r.output_file).collect();

    assert_eq!(first, ["photo.webp", "other.webp"]);
    assert_eq!(first, second);
}

#[test]
fn disambiguating_mode_never_reuses_names() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let files = vec![
        write_png(input.path(), "photo.png", 16, 16),
        write_png(input.path(), "photo.jpg.png", 16, 16),
    ];
    let options = ConversionOptions::new(files, output.path().to_path_buf()).with_overwrite(false);
    let converter = BatchConverter::new();

    converter.run_silent(&options).unwrap();
    let first: Vec<_> = manifest_records(output.path()).into_iter().map(|r| r.output_file).collect();
    converter.run_silent(&options).unwrap();
    let second: Vec<_> = manifest_records(output.path()).into_iter().map(|r| r.output_file).collect();

    assert_eq!(first, ["photo.webp", "photo.jpg.webp"]);
    assert_eq!(second, ["photo-1.webp", "photo.jpg-1.webp"]);
    assert!(first.iter().all(|name| !second.contains(name)));
}

#[test]
fn conflicts_are_detected_after_a_run() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let files = vec![write_png(input.path(), "a.png", 8, 8)];
    let options = ConversionOptions::new(files.clone(), output.path().to_path_buf());
    let converter = BatchConverter::new();

    let before = detect_output_conflicts(&options, &converter.get_expected_output_names(&options));
    assert!(!before.has_conflicts());

    converter.run_silent(&options).unwrap();
    let after = detect_output_conflicts(&options, &converter.get_expected_output_names(&options));
    assert!(after.has_conflicts());
    assert!(after.gallery_json_exists);
    assert_eq!(after.duplicate_files, ["a.webp"]);
}

#[test]
fn exif_fields_reach_the_manifest() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let files = vec![write_jpeg_with_exif(input.path(), "IMG_001.JPG")];
    let options = ConversionOptions::new(files, output.path().to_path_buf());

    let result = BatchConverter::new().run_silent(&options).unwrap();
    assert_eq!(result.succeeded, 1);

    let records = manifest_records(output.path());
    let record = &records[0];
    assert_eq!(record.source_file, "IMG_001.JPG");
    assert_eq!(record.output_file, "IMG_001.webp");
    assert_eq!(record.api_url, None);

    let metadata = &record.metadata;
    assert_eq!(metadata.get_str("camera_model"), Some("TestCam 5"));
    assert_eq!(metadata.get_str("shutter_speed"), Some("1/250"));
    assert_eq!(metadata.get_str("aperture"), Some("f/2.8"));
    assert_eq!(metadata.get_str("focal_length"), Some("50mm"));
    assert_eq!(metadata.get("iso"), Some(&serde_json::json!(400)));
    assert_eq!(metadata.get("image_width"), Some(&serde_json::json!(64)));
    assert!(!metadata.contains_key("lens"));
    assert!(!metadata.contains_key("artist"));
}
