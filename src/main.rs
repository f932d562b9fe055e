use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, ValueEnum};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::thread;

use photopress::{
    BatchConverter, BatchResult, ChannelReporter, Config, ConversionOptions, OutputConflicts,
    ReportFormat, ResizeOptions, detect_output_conflicts, filter_supported_images,
    generate_report, manifest::list_exported_images, progress::ConsoleProgressReporter,
    read_gallery_data, resolve_effective_output_dir,
    utils::{collect_input_files, format_bytes, format_duration},
};

/// photopress - batch photo optimizer for the web
///
/// Converts photographs to WebP, optionally resizing them, and writes a
/// gallery-data.json manifest with each image's camera metadata
#[derive(Parser)]
#[command(name = "photopress")]
#[command(about = "photopress - batch photo optimizer with an EXIF gallery manifest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = r#"
photopress converts a folder of photographs into web-ready WebP files.

Features:
• Quality-controlled lossy WebP encoding at maximum compression effort
• Optional resizing, with or without keeping the aspect ratio
• Camera metadata (ISO, shutter speed, aperture, lens...) per image
• A gallery-data.json manifest with optional public URLs
• Conflict detection before anything in the output folder is replaced
"#)]
pub struct Args {
    /// Input images or directories
    #[arg(value_name = "PATH", required_unless_present = "inspect")]
    pub inputs: Vec<PathBuf>,

    /// Output base directory; files are written to its "exported" subdirectory
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// WebP compression quality (1-100)
    #[arg(short, long, value_name = "QUALITY", value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: Option<u8>,

    /// Base name for outputs, producing NAME-1.webp, NAME-2.webp, ...
    #[arg(long, value_name = "NAME")]
    pub export_name: Option<String>,

    /// Public URL prefix recorded for each image in the manifest
    #[arg(long, value_name = "URL")]
    pub api_url: Option<String>,

    /// Keep existing files and pick a free name (photo-1.webp, ...) instead
    #[arg(long)]
    pub no_overwrite: bool,

    /// Resize to this width (pixels)
    #[arg(long, value_name = "PX")]
    pub width: Option<u32>,

    /// Resize to this height (pixels)
    #[arg(long, value_name = "PX")]
    pub height: Option<u32>,

    /// Resize to exactly --width x --height, ignoring the aspect ratio
    #[arg(long)]
    pub stretch: bool,

    /// Do not descend into subdirectories of input directories
    #[arg(long)]
    pub no_recursive: bool,

    /// Proceed without asking when the output folder already has data
    #[arg(short, long)]
    pub yes: bool,

    /// Show the manifest and exported images of the output folder, then exit
    #[arg(long)]
    pub inspect: bool,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Use a predefined configuration profile
    #[arg(long, value_name = "PROFILE", requires = "config")]
    pub profile: Option<String>,

    /// Generate a run report in the current directory
    #[arg(long)]
    pub report: bool,

    /// Report output format
    #[arg(long, default_value = "json", value_enum)]
    pub report_format: ReportFormatArg,

    /// Verbose output mode
    #[arg(short, long)]
    pub verbose: bool,

    /// Quiet mode (results only)
    #[arg(long, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ReportFormatArg {
    Json,
    Csv,
}

impl From<ReportFormatArg> for ReportFormat {
    fn from(format: ReportFormatArg) -> Self {
        match format {
            ReportFormatArg::Json => ReportFormat::Json,
            ReportFormatArg::Csv => ReportFormat::Csv,
        }
    }
}

fn main() -> Result<()> {
    if std::env::args().len() == 1 {
        Args::command().print_help()?;
        println!();
        std::process::exit(0);
    }

    let args = Args::parse();

    // Initialize logging
    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else if !args.quiet {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    }

    let options = build_options(&args)?;

    if args.inspect {
        return inspect_output(&options.output_dir);
    }

    if options.input_files.is_empty() {
        bail!("No supported images found (accepted: {})", photopress::SUPPORTED_EXTENSIONS.join(", "));
    }
    options.validate()?;

    let converter = BatchConverter::new();
    let conflicts = detect_output_conflicts(&options, &converter.get_expected_output_names(&options));
    if conflicts.has_conflicts() && !args.yes && !confirm_overwrite(&conflicts)? {
        println!("Conversion cancelled due to output conflicts.");
        return Ok(());
    }

    let result = run_on_worker(converter, options, args.quiet)?;

    if args.report {
        let path = generate_report(&result, args.report_format.into(), Path::new("."))?;
        println!("Report saved to: {}", path.display());
    }

    if !args.quiet {
        print_results_summary(&result);
    }

    Ok(())
}

/// Layer defaults, config file, profile and flags into run options
fn build_options(args: &Args) -> Result<ConversionOptions> {
    let mut options = ConversionOptions::default();
    if let Some(path) = &args.config {
        options = Config::load(path)?.apply_to(options, args.profile.as_deref())?;
    }

    let base_dir = match (&args.output, options.output_dir.as_os_str().is_empty()) {
        (Some(dir), _) => dir.clone(),
        (None, false) => options.output_dir.clone(),
        (None, true) => std::env::current_dir().context("Failed to resolve current directory")?,
    };
    options.output_dir = resolve_effective_output_dir(&base_dir);

    let files = collect_input_files(&args.inputs, !args.no_recursive)?;
    options.input_files = filter_supported_images(files);

    if let Some(quality) = args.quality {
        options.quality = quality;
    }
    if args.export_name.is_some() {
        options.export_name = args.export_name.clone();
    }
    if args.api_url.is_some() {
        options.api_base_url = args.api_url.clone();
    }
    if args.no_overwrite {
        options.overwrite = false;
    }
    if args.width.is_some() || args.height.is_some() {
        options.resize = if args.stretch {
            ResizeOptions::exact(args.width, args.height)
        } else {
            ResizeOptions::fit(args.width, args.height)
        };
    }

    Ok(options)
}

/// Run the batch on a worker thread and render its events here
fn run_on_worker(converter: BatchConverter, options: ConversionOptions, quiet: bool) -> Result<BatchResult> {
    let (sender, receiver) = crossbeam_channel::unbounded();

    let worker = thread::spawn(move || {
        let reporter = ChannelReporter::new(sender);
        converter.run_with_progress(&options, &reporter)
    });

    let console = (!quiet).then(ConsoleProgressReporter::new);
    for event in receiver {
        if let Some(console) = &console {
            console.apply(event);
        }
    }

    match worker.join() {
        Ok(result) => result,
        Err(_) => bail!("Conversion worker panicked"),
    }
}

fn confirm_overwrite(conflicts: &OutputConflicts) -> Result<bool> {
    println!("The output directory already contains existing data:");
    if conflicts.gallery_json_exists {
        println!("  - {} already exists", photopress::GALLERY_FILENAME);
    }
    if !conflicts.duplicate_files.is_empty() {
        let mut preview = conflicts.duplicate_files.iter().take(5).cloned().collect::<Vec<_>>().join(", ");
        if conflicts.duplicate_files.len() > 5 {
            preview.push_str(", ...");
        }
        println!("  - Duplicate output images found: {preview}");
    }
    print!("Do you want to proceed and overwrite? [y/N] ");
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn inspect_output(exported_dir: &Path) -> Result<()> {
    println!("Exported directory: {}", exported_dir.display());
    if !exported_dir.exists() {
        println!("Exported folder does not exist yet.");
        return Ok(());
    }

    let status = read_gallery_data(exported_dir);
    let images = list_exported_images(exported_dir)?;
    println!("{}", status.describe());

    if images.is_empty() {
        println!("No exported images found.");
        return Ok(());
    }

    println!("Loaded {} image(s):", images.len());
    for image in &images {
        match status.find(image) {
            Some(record) => {
                let json = serde_json::to_string_pretty(record)?;
                println!("\n{image}\n{json}");
            }
            None => println!("\n{image}\n  (no matching object in {})", photopress::GALLERY_FILENAME),
        }
    }
    Ok(())
}

fn print_results_summary(result: &BatchResult) {
    println!("\n🎉 Conversion completed!");
    println!("📊 Results Summary:");
    println!("  ✅ Converted: {}/{} files", result.succeeded, result.total);
    if result.failed > 0 {
        println!("  ❌ Failed: {} files", result.failed);
    }

    if result.input_total_bytes > 0 {
        println!("\n💾 Space Analysis:");
        println!("  📦 Original size: {}", format_bytes(result.input_total_bytes));
        println!("  🗜️ Compressed size: {}", format_bytes(result.output_total_bytes));
        println!(
            "  💾 Space saved: {} ({:.2}%)",
            format_bytes(result.bytes_saved()),
            result.percent_saved()
        );
    }

    println!("\n⏱️ Duration: {}", format_duration(result.duration));
    println!("📄 Manifest: {}", result.gallery_json_path.display());

    if !result.errors.is_empty() && result.errors.len() <= 5 {
        println!("\n❌ Errors:");
        for error in &result.errors {
            println!("  • {}", error);
        }
    } else if result.errors.len() > 5 {
        println!("\n❌ {} errors occurred (use --report for full details)", result.errors.len());
    }
}
