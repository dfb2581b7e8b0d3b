//! Compress a video file to WebM under a size budget.
//!
//! Usage:
//!   cargo run --example compress -- <input_file> [max_mb]
//!
//! The output is written next to the input with a `.webm` extension.

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use vidsqueeze::{CompressOptions, CompressionStage, ProgressCallback, ProgressInfo, SourceMedia};

/// Drives a progress bar from playback position, in tenths of a percent.
struct BarProgress {
    bar: ProgressBar,
}

impl ProgressCallback for BarProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Some(pct) = info.percentage {
            self.bar.set_position((pct * 10.0) as u64);
        }
        let message = match info.stage {
            CompressionStage::Probing => "probing".to_string(),
            CompressionStage::Finalizing => "finalizing".to_string(),
            _ => format!("{} frames", info.frames_drawn),
        };
        self.bar.set_message(message);
    }
}

fn mime_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        _ => "video/mp4",
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let input_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "input.mp4".to_string());
    let max_size_mb: f64 = match std::env::args().nth(2) {
        Some(value) => value.parse()?,
        None => vidsqueeze::DEFAULT_MAX_SIZE_MB,
    };

    let path = Path::new(&input_path);
    let bytes = std::fs::read(path)?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("input.mp4");
    let source = SourceMedia::new(bytes, name, mime_type(path));

    let bar = ProgressBar::new(1000);
    let style = ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {msg}")?;
    bar.set_style(style.progress_chars("##-"));

    let options = CompressOptions::new()
        .with_max_size_mb(max_size_mb)
        .with_progress(Arc::new(BarProgress { bar: bar.clone() }))
        .with_batch_size(10);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let outcome = runtime.block_on(vidsqueeze::compress_with_options(source, options));
    bar.finish_and_clear();

    let result = match outcome {
        Ok(result) => result,
        Err(error) => {
            eprintln!("{} {error}", "error:".red().bold());
            return Err(error.into());
        }
    };

    let output = path.with_file_name(&result.file_name);
    std::fs::write(&output, &result.bytes)?;

    println!(
        "{} {}x{} @ {} bps",
        "plan".cyan().bold(),
        result.plan.target_width,
        result.plan.target_height,
        result.plan.target_bitrate
    );
    println!(
        "{} {} -> {} bytes ({:.1}% smaller)",
        "size".cyan().bold(),
        result.original_size,
        result.compressed_size,
        result.reduction_percent()
    );
    println!("{} {}", "saved".green().bold(), output.display());
    Ok(())
}
