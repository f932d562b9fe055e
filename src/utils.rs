use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

/// Input extensions the pipeline accepts, lowercase
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "bmp", "webp"];

/// Format duration in human-readable format
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

/// Byte count with decimal units, e.g. "1.53 MB"
pub fn format_bytes(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::DECIMAL.decimal_places(2))
}

/// Get file extension (lowercase)
fn get_file_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Whether the path carries one of the supported image extensions
pub fn is_supported_image(path: &Path) -> bool {
    get_file_extension(path)
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Keep only supported images, preserving order
pub fn filter_supported_images(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    paths.into_iter().filter(|p| is_supported_image(p)).collect()
}

/// Expand directories into the files beneath them, in a stable order.
///
/// Plain file arguments are passed through untouched; directory contents are
/// sorted by path so repeated runs number their outputs identically.
pub fn collect_input_files(inputs: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for input in inputs {
        if !input.is_dir() {
            files.push(input.clone());
            continue;
        }

        let max_depth = if recursive { usize::MAX } else { 1 };
        for entry in WalkDir::new(input)
            .follow_links(false)
            .max_depth(max_depth)
            .sort_by_file_name()
        {
            let entry = entry.context("Failed to read directory entry")?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
    }

    Ok(files)
}
