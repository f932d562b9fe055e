use anyhow::{Context, Result};
use chrono::Utc;
use std::path::Path;
use std::time::Instant;

use crate::{
    BatchResult,
    config::ConversionOptions,
    converter::{ImageConverter, resize_image},
    manifest::{ConvertedImageRecord, build_api_url, write_gallery_data},
    metadata::MetadataExtractor,
    naming::OutputNamer,
    progress::{CallbackReporter, NoOpProgressReporter, ProgressReporter},
    stats::ConversionStats,
};

/// Drives the conversion pipeline over a list of input files.
///
/// Files are processed one at a time, in order. A failure in any file is
/// counted and logged, and never stops the batch.
#[derive(Debug, Default)]
pub struct BatchConverter;

impl BatchConverter {
    pub fn new() -> Self {
        Self
    }

    /// Run the batch with optional progress and log callbacks
    pub fn run(
        &self,
        options: &ConversionOptions,
        on_progress: Option<&dyn Fn(usize, usize)>,
        on_log: Option<&dyn Fn(&str)>,
    ) -> Result<BatchResult> {
        let reporter = CallbackReporter::new(on_progress, on_log);
        self.run_with_progress(options, &reporter)
    }

    /// Run the batch without any reporting
    pub fn run_silent(&self, options: &ConversionOptions) -> Result<BatchResult> {
        self.run_with_progress(options, &NoOpProgressReporter)
    }

    /// Run the batch, reporting through `reporter`.
    ///
    /// Fails before touching the filesystem when the options are invalid, and
    /// before processing anything when the output directory cannot be created.
    pub fn run_with_progress(
        &self,
        options: &ConversionOptions,
        reporter: &dyn ProgressReporter,
    ) -> Result<BatchResult> {
        options.validate()?;

        let started = Instant::now();
        let started_at = Utc::now();

        std::fs::create_dir_all(&options.output_dir).with_context(|| {
            format!(
                "Failed to create output directory: {}",
                options.output_dir.display()
            )
        })?;

        let total = options.input_files.len();
        log::info!(
            "Converting {} file(s) into {} at quality {}",
            total,
            options.output_dir.display(),
            options.quality
        );
        reporter.set_total_files(total);

        let converter = ImageConverter::new(options.quality);
        let mut namer = OutputNamer::new(options);
        let mut stats = ConversionStats::new();
        let mut records = Vec::new();

        for (offset, source_path) in options.input_files.iter().enumerate() {
            let index = offset + 1;
            let source_name = display_name(source_path);
            reporter.log_message(&format!("[{index}/{total}] Processing: {source_name}"));

            match self.process_single_file(&converter, &mut namer, options, source_path, index) {
                Ok(converted) => {
                    stats.record_success(converted.input_size, converted.output_size);
                    reporter.log_message(&format!("Saved: {}", converted.record.output_file));
                    records.push(converted.record);
                }
                Err(e) => {
                    let message = format!("{e:#}");
                    log::warn!("Failed to convert {}: {}", source_path.display(), message);
                    reporter.log_message(&format!("Failed: {source_name} ({message})"));
                    stats.record_error(source_name, message);
                }
            }

            reporter.update_progress(index, total);
        }

        let gallery_json_path = write_gallery_data(&options.output_dir, &records)?;
        reporter.log_message(&format!(
            "Metadata file created: {}",
            display_name(&gallery_json_path)
        ));
        reporter.finish_conversion();

        let duration = started.elapsed();
        log::info!(
            "Finished: {} succeeded, {} failed in {:.1}s",
            stats.succeeded,
            stats.failed,
            duration.as_secs_f64()
        );

        Ok(BatchResult {
            total: total as u64,
            succeeded: stats.succeeded,
            failed: stats.failed,
            gallery_json_path,
            output_dir: options.output_dir.clone(),
            input_total_bytes: stats.input_bytes,
            output_total_bytes: stats.output_bytes,
            quality: options.quality,
            started_at,
            finished_at: Utc::now(),
            duration,
            errors: stats.errors(),
        })
    }

    /// Names each input would be written under, without touching the disk.
    ///
    /// These are the names before collision handling, i.e. exactly the files an
    /// overwriting run would replace.
    pub fn get_expected_output_names(&self, options: &ConversionOptions) -> Vec<String> {
        let namer = OutputNamer::new(options);
        options
            .input_files
            .iter()
            .enumerate()
            .map(|(offset, source)| namer.base_name(source, offset + 1))
            .collect()
    }

    /// Decode, extract, resize and encode a single file
    fn process_single_file(
        &self,
        converter: &ImageConverter,
        namer: &mut OutputNamer<'_>,
        options: &ConversionOptions,
        source_path: &Path,
        index: usize,
    ) -> Result<ConvertedFile> {
        let output_name = namer.next_name(source_path, index);
        let output_path = options.output_dir.join(&output_name);

        let bytes = std::fs::read(source_path)
            .with_context(|| format!("Failed to read file: {}", source_path.display()))?;
        let image = ImageConverter::decode(&bytes, source_path)?;

        // Metadata describes the source, so it is taken before resizing.
        let metadata = MetadataExtractor::extract(&bytes, &image);
        log::debug!("{}: {} metadata field(s)", source_path.display(), metadata.len());

        let resized = resize_image(&image, &options.resize);
        let output_size = converter.encode_to_file(&resized, &output_path)?;

        Ok(ConvertedFile {
            record: ConvertedImageRecord {
                source_file: display_name(source_path),
                api_url: build_api_url(options.api_base_url.as_deref(), &output_name),
                output_file: output_name,
                metadata,
            },
            input_size: bytes.len() as u64,
            output_size,
        })
    }
}

struct ConvertedFile {
    record: ConvertedImageRecord,
    input_size: u64,
    output_size: u64,
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
