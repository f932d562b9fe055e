//! # Photopress Library
//!
//! Batch pipeline that converts photographs to lossy WebP for the web,
//! optionally resizing them, and records each image's camera metadata in a
//! `gallery-data.json` manifest next to the outputs.
//!
//! The entry point is [`BatchConverter::run`]; [`detect_output_conflicts`]
//! lets a caller check what a run would overwrite before starting it.

pub mod config;
pub mod converter;
pub mod core;
pub mod manifest;
pub mod metadata;
pub mod naming;
pub mod progress;
pub mod stats;
pub mod utils;
pub mod validation;

// Re-export commonly used types
pub use config::{Config, ConversionOptions, OptionsError, ProfileConfig, ResizeOptions};
pub use converter::ImageConverter;
pub use crate::core::BatchConverter;
pub use manifest::{
    ConvertedImageRecord, GALLERY_FILENAME, ManifestStatus, build_api_url, read_gallery_data,
    write_gallery_data,
};
pub use metadata::{ImageMetadata, MetadataExtractor};
pub use progress::{ChannelReporter, ProgressEvent, ProgressReporter};
pub use utils::{SUPPORTED_EXTENSIONS, filter_supported_images, is_supported_image};
pub use validation::{OutputConflicts, detect_output_conflicts, resolve_effective_output_dir};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Outcome of one batch run
#[derive(Debug, Serialize, Clone)]
pub struct BatchResult {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub gallery_json_path: PathBuf,
    pub output_dir: PathBuf,
    pub input_total_bytes: u64,
    pub output_total_bytes: u64,
    pub quality: u8,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration: Duration,
    pub errors: Vec<String>,
}

impl BatchResult {
    pub fn bytes_saved(&self) -> u64 {
        self.input_total_bytes.saturating_sub(self.output_total_bytes)
    }

    /// Percentage of input bytes saved, 0 when no input bytes were read
    pub fn percent_saved(&self) -> f64 {
        stats::percent_saved(self.input_total_bytes, self.output_total_bytes)
    }
}

/// Report output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Csv,
}

impl ReportFormat {
    fn file_name(self) -> &'static str {
        match self {
            ReportFormat::Json => "photopress_report.json",
            ReportFormat::Csv => "photopress_report.csv",
        }
    }
}

/// Write a run summary into `dir`, returning the report's path
pub fn generate_report(result: &BatchResult, format: ReportFormat, dir: &Path) -> Result<PathBuf> {
    let report_path = dir.join(format.file_name());
    match format {
        ReportFormat::Json => generate_json_report(result, &report_path)?,
        ReportFormat::Csv => generate_csv_report(result, &report_path)?,
    }
    Ok(report_path)
}

fn generate_json_report(result: &BatchResult, report_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(result)?;
    std::fs::write(report_path, json)
        .with_context(|| format!("Failed to write report: {}", report_path.display()))
}

fn generate_csv_report(result: &BatchResult, report_path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(report_path)
        .with_context(|| format!("Failed to create report: {}", report_path.display()))?;

    let rows = [
        ("started_at", result.started_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
        ("finished_at", result.finished_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
        ("duration_seconds", format!("{:.2}", result.duration.as_secs_f64())),
        ("output_dir", result.output_dir.display().to_string()),
        ("gallery_json", result.gallery_json_path.display().to_string()),
        ("total_files", result.total.to_string()),
        ("succeeded", result.succeeded.to_string()),
        ("failed", result.failed.to_string()),
        ("input_bytes", result.input_total_bytes.to_string()),
        ("output_bytes", result.output_total_bytes.to_string()),
        ("bytes_saved", result.bytes_saved().to_string()),
        ("percent_saved", format!("{:.2}", result.percent_saved())),
        ("quality", result.quality.to_string()),
    ];

    writer.write_record(["metric", "value"])?;
    for (metric, value) in rows {
        writer.write_record([metric, value.as_str()])?;
    }
    for error in &result.errors {
        writer.write_record(["error", error.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}
