//! The gallery manifest: a JSON array describing every converted image.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::metadata::ImageMetadata;

/// Fixed name of the manifest inside the output directory
pub const GALLERY_FILENAME: &str = "gallery-data.json";

/// Extensions listed when browsing an output directory
const EXPORTED_IMAGE_EXTENSIONS: &[&str] = &["webp", "jpg", "jpeg", "png", "bmp", "tif", "tiff"];

/// One successfully converted image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertedImageRecord {
    #[serde(default)]
    pub source_file: String,
    pub output_file: String,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub metadata: ImageMetadata,
}

/// `{base_url without trailing slashes}/{output_name}`, or `None` without a base
pub fn build_api_url(base_url: Option<&str>, output_name: &str) -> Option<String> {
    let base = base_url.filter(|b| !b.trim().is_empty())?;
    Some(format!("{}/{}", base.trim_end_matches('/'), output_name))
}

/// Location of the manifest for an output directory
pub fn gallery_path(output_dir: &Path) -> PathBuf {
    output_dir.join(GALLERY_FILENAME)
}

/// Serialize `records` to the manifest, replacing any previous one
pub fn write_gallery_data(output_dir: &Path, records: &[ConvertedImageRecord]) -> Result<PathBuf> {
    let path = gallery_path(output_dir);
    let json = serde_json::to_string_pretty(records).context("Failed to serialize gallery data")?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write gallery data: {}", path.display()))?;
    log::debug!("Wrote {} record(s) to {}", records.len(), path.display());
    Ok(path)
}

/// Outcome of reading a manifest back
#[derive(Debug)]
pub enum ManifestStatus {
    Missing,
    Loaded(Vec<ConvertedImageRecord>),
    Unreadable(String),
    InvalidShape,
}

impl ManifestStatus {
    pub fn records(&self) -> &[ConvertedImageRecord] {
        match self {
            ManifestStatus::Loaded(records) => records,
            _ => &[],
        }
    }

    /// Record describing the given output file, if any
    pub fn find(&self, output_file: &str) -> Option<&ConvertedImageRecord> {
        self.records().iter().find(|r| r.output_file == output_file)
    }

    /// Human-readable description of the status
    pub fn describe(&self) -> String {
        match self {
            ManifestStatus::Missing => format!("{GALLERY_FILENAME} not found"),
            ManifestStatus::Loaded(records) => format!("Loaded {} JSON record(s)", records.len()),
            ManifestStatus::Unreadable(reason) => {
                format!("Could not read {GALLERY_FILENAME} (invalid or inaccessible): {reason}")
            }
            ManifestStatus::InvalidShape => format!("{GALLERY_FILENAME} format is invalid"),
        }
    }
}

/// Load the manifest from `output_dir`.
///
/// Never fails; a broken manifest is reported through the status instead.
/// Array items that are not records with an `output_file` are skipped.
pub fn read_gallery_data(output_dir: &Path) -> ManifestStatus {
    let path = gallery_path(output_dir);
    if !path.exists() {
        return ManifestStatus::Missing;
    }

    let payload = match std::fs::read_to_string(&path)
        .map_err(|e| e.to_string())
        .and_then(|text| serde_json::from_str::<serde_json::Value>(&text).map_err(|e| e.to_string()))
    {
        Ok(payload) => payload,
        Err(reason) => {
            log::warn!("Failed to read {}: {}", path.display(), reason);
            return ManifestStatus::Unreadable(reason);
        }
    };

    let serde_json::Value::Array(items) = payload else {
        return ManifestStatus::InvalidShape;
    };

    let records = items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<ConvertedImageRecord>(item).ok())
        .collect();
    ManifestStatus::Loaded(records)
}

/// Sorted names of the image files directly inside `output_dir`
pub fn list_exported_images(output_dir: &Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(output_dir)
        .with_context(|| format!("Failed to list directory: {}", output_dir.display()))?;

    let mut names = Vec::new();
    for entry in entries {
        let path = entry.context("Failed to read directory entry")?.path();
        if !path.is_file() {
            continue;
        }
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| EXPORTED_IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false);
        if let (true, Some(name)) = (is_image, path.file_name()) {
            names.push(name.to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(output: &str) -> ConvertedImageRecord {
        let mut metadata = ImageMetadata::default();
        metadata.insert("camera_model", Some("Ω-1".into()));
        metadata.insert("image_width", Some(10.into()));
        ConvertedImageRecord {
            source_file: "src.jpg".into(),
            output_file: output.into(),
            api_url: None,
            metadata,
        }
    }

    #[test]
    fn api_url_strips_trailing_slashes() {
        assert_eq!(
            build_api_url(Some("https://cdn.example.com/gallery/"), "a.webp").as_deref(),
            Some("https://cdn.example.com/gallery/a.webp")
        );
        assert_eq!(
            build_api_url(Some("https://cdn.example.com//"), "a.webp").as_deref(),
            Some("https://cdn.example.com/a.webp")
        );
    }

    #[test]
    fn api_url_only_strips_trailing_slashes() {
        assert_eq!(
            build_api_url(Some("  https://cdn.example.com/"), "a.webp").as_deref(),
            Some("  https://cdn.example.com/a.webp")
        );
    }

    #[test]
    fn api_url_absent_without_base() {
        assert_eq!(build_api_url(None, "a.webp"), None);
        assert_eq!(build_api_url(Some(""), "a.webp"), None);
        assert_eq!(build_api_url(Some("   "), "a.webp"), None);
    }

    #[test]
    fn writes_pretty_json_in_field_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_gallery_data(dir.path(), &[record("a.webp")]).unwrap();
        assert_eq!(path, dir.path().join(GALLERY_FILENAME));

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  {\n    \"source_file\""));
        assert!(text.contains("Ω-1"), "non-ASCII must not be escaped");
        assert!(text.contains("\"api_url\": null"));

        let source = text.find("source_file").unwrap();
        let output = text.find("output_file").unwrap();
        let api = text.find("api_url").unwrap();
        let metadata = text.find("metadata").unwrap();
        assert!(source < output && output < api && api < metadata);
    }

    #[test]
    fn writes_empty_array_for_no_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_gallery_data(dir.path(), &[]).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "[]");
    }

    #[test]
    fn reads_back_written_records() {
        let dir = tempfile::tempdir().unwrap();
        write_gallery_data(dir.path(), &[record("a.webp"), record("b.webp")]).unwrap();
        let status = read_gallery_data(dir.path());
        assert_eq!(status.records().len(), 2);
        assert_eq!(status.find("b.webp"), Some(&record("b.webp")));
        assert!(status.find("c.webp").is_none());
    }

    #[test]
    fn missing_and_broken_manifests_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(read_gallery_data(dir.path()), ManifestStatus::Missing));

        std::fs::write(gallery_path(dir.path()), "{ not json").unwrap();
        let status = read_gallery_data(dir.path());
        assert!(matches!(status, ManifestStatus::Unreadable(_)));
        assert!(status.records().is_empty());

        std::fs::write(gallery_path(dir.path()), r#"{"output_file": "a.webp"}"#).unwrap();
        assert!(matches!(read_gallery_data(dir.path()), ManifestStatus::InvalidShape));
    }

    #[test]
    fn skips_malformed_items() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            gallery_path(dir.path()),
            r#"[1, {"source_file": "x"}, {"output_file": "ok.webp"}]"#,
        )
        .unwrap();
        let status = read_gallery_data(dir.path());
        assert_eq!(status.records().len(), 1);
        assert_eq!(status.records()[0].output_file, "ok.webp");
        assert_eq!(status.records()[0].api_url, None);
    }

    #[test]
    fn lists_only_images_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.webp", "a.WEBP", "notes.txt", GALLERY_FILENAME] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.webp")).unwrap();
        assert_eq!(list_exported_images(dir.path()).unwrap(), ["a.WEBP", "b.webp"]);
    }
}
