// ============================================================================
// PaintFE Bridge CLI: headless batch processing via command-line arguments
// ============================================================================
//
// Usage examples:
//   paintfe-bridge --input photo.png --script invert.rhai --output result.png
//   paintfe-bridge -i photo.jpg -o out.png                 (format inferred from output ext)
//   paintfe-bridge -i "*.jpg" -s blur.rhai --output-dir processed/ -f png
//   paintfe-bridge -i scan.png -s levels.rhai --pixel-format gray8 -o scan_out.png
//
// Every file runs through load → script → flatten → save on the current
// thread.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use image::{DynamicImage, ImageFormat};
use tracing::{info, warn};

use crate::config::BridgeConfig;
use crate::document::Document;
use crate::pixel::PixelFormat;
use crate::scripting::execute_script_sync;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// PaintFE scripting bridge, headless mode.
#[derive(Parser, Debug)]
#[command(
    name = "paintfe-bridge",
    version,
    about = "Run PaintFE bridge scripts on image files",
    long_about = "Load each input image as a one-layer document, run a Rhai script\n\
                  against it, flatten the result and save it.\n\n\
                  Example:\n  \
                  paintfe-bridge --input photo.png --script invert.rhai --output result.png\n  \
                  paintfe-bridge -i \"*.jpg\" -s adjust.rhai --output-dir out/ -f png"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Rhai script to run on each input. When omitted, images are only
    /// loaded and re-saved.
    #[arg(short, long, value_name = "SCRIPT.rhai")]
    pub script: Option<PathBuf>,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: png, jpeg, bmp, tga, tiff.
    /// When omitted, the format is inferred from --output's extension, defaulting to png.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// Pixel format of the layer the script sees: gray8, rgba8, rgba16.
    #[arg(long, default_value = "rgba8", value_name = "FORMAT")]
    pub pixel_format: String,

    /// JSON file with sandbox, history and step-budget settings.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print script console output, warnings and per-file timing.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    let pixel_format: PixelFormat = match args.pixel_format.parse() {
        Ok(f) => f,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let config = match &args.config {
        Some(path) => match BridgeConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("error: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => BridgeConfig::default(),
    };

    let save_format = match parse_format(args.format.as_deref(), args.output.as_deref()) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let script_source: Option<String> = match &args.script {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(src) => Some(src),
            Err(e) => {
                eprintln!("error: could not read script '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

    let job = Job {
        script: script_source.as_deref(),
        format: save_format,
        pixel_format,
        config: &config,
        verbose: args.verbose,
    };

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let Some(output_path) =
            build_output_path(input_path, args.output.as_deref(), args.output_dir.as_deref(), save_format)
        else {
            eprintln!("  error: cannot determine output path for '{}'.", input_path.display());
            any_failure = true;
            continue;
        };

        match run_one(input_path, &output_path, &job) {
            Ok(()) => {
                info!("Wrote {}", output_path.display());
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                warn!("{}: {}", input_path.display(), e);
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

struct Job<'a> {
    script: Option<&'a str>,
    format: ImageFormat,
    pixel_format: PixelFormat,
    config: &'a BridgeConfig,
    verbose: bool,
}

fn run_one(input: &Path, output: &Path, job: &Job<'_>) -> Result<(), String> {
    // -- Step 1: Load ----------------------------------------------------
    let image = image::open(input).map_err(|e| format!("load failed: {}", e))?.to_rgba8();
    let name = input.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let mut document = Document::from_rgba_image(name, &image, job.pixel_format);

    // -- Step 2: Apply script (optional) ---------------------------------
    if let Some(src) = job.script {
        let outcome = execute_script_sync(src, document, job.config)
            .map_err(|f| format!("script error: {}", f.error.friendly_message()))?;
        if job.verbose {
            for line in &outcome.console_output {
                println!("  [script] {}", line);
            }
            for w in &outcome.warnings {
                println!("  [warning] {}", w);
            }
        }
        document = outcome.document;
    }

    // -- Step 3: Flatten & save ------------------------------------------
    let flat = document.flatten().map_err(|e| format!("flatten failed: {}", e))?;
    let encoded = match job.format {
        // No alpha channel in JPEG
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(flat).to_rgb8()),
        _ => DynamicImage::ImageRgba8(flat),
    };
    encoded
        .save_with_format(output, job.format)
        .map_err(|e| format!("save failed: {}", e))
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

fn format_from_name(name: &str) -> Option<ImageFormat> {
    match name.to_lowercase().as_str() {
        "png" => Some(ImageFormat::Png),
        "jpeg" | "jpg" => Some(ImageFormat::Jpeg),
        "bmp" => Some(ImageFormat::Bmp),
        "tga" => Some(ImageFormat::Tga),
        "tiff" | "tif" => Some(ImageFormat::Tiff),
        _ => None,
    }
}

/// Choose the output format from `--format` or the output file extension.
/// Defaults to PNG when neither is given.
fn parse_format(format_arg: Option<&str>, output: Option<&Path>) -> Result<ImageFormat, String> {
    if let Some(f) = format_arg {
        return format_from_name(f).ok_or_else(|| format!("unsupported output format '{}'", f));
    }
    let ext = output.and_then(|o| o.extension()).and_then(|e| e.to_str()).unwrap_or("");
    Ok(format_from_name(ext).unwrap_or(ImageFormat::Png))
}

fn extension(format: ImageFormat) -> &'static str {
    format.extensions_str().first().copied().unwrap_or("png")
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, derives filename from input stem)
/// 3. Fallback: same directory as input, same stem, new extension
///    (appends `_out` to stem if it would collide with the input path)
fn build_output_path(input: &Path, output: Option<&Path>, output_dir: Option<&Path>, format: ImageFormat) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let ext = extension(format);
    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.{}", stem, ext)));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    let candidate = parent.join(format!("{}.{}", stem, ext));

    // Avoid silent overwrite of the input
    if candidate == input {
        Some(parent.join(format!("{}_out.{}", stem, ext)))
    } else {
        Some(candidate)
    }
}
