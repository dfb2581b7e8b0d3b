//! Progress reporting for long-running compressions.
//!
//! A compression runs in real time against the source's playback clock, so a
//! five-minute video takes roughly five minutes to squeeze. Attach a
//! [`ProgressCallback`] through
//! [`CompressOptions::with_progress`](crate::CompressOptions::with_progress)
//! to observe it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use vidsqueeze::{CompressOptions, ProgressCallback, ProgressInfo};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         if let Some(pct) = info.percentage {
//!             println!("[{:?}] {pct:.1}% complete", info.stage);
//!         }
//!     }
//! }
//!
//! let options = CompressOptions::new()
//!     .with_progress(Arc::new(PrintProgress))
//!     .with_batch_size(25);
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

/// The phase a compression is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum CompressionStage {
    /// Loading the source and reading its metadata.
    Probing,
    /// Drawing frames and feeding the encoder.
    Encoding,
    /// Flushing the encoder and assembling the output.
    Finalizing,
}

/// A snapshot of compression progress.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Current phase.
    pub stage: CompressionStage,
    /// Source frames drawn into the frame buffer so far.
    pub frames_drawn: u64,
    /// Playback position of the most recently drawn frame.
    pub position: Duration,
    /// Source duration, once known.
    pub duration: Option<Duration>,
    /// Completion percentage (0.0 – 100.0), if the duration is known.
    pub percentage: Option<f32>,
    /// Wall-clock time elapsed since the tracker was created.
    pub elapsed: Duration,
    /// Estimated time remaining, based on current throughput.
    pub estimated_remaining: Option<Duration>,
}

/// Trait for receiving progress updates during compression.
///
/// Callbacks only observe; they cannot halt the operation.
pub trait ProgressCallback: Send + Sync {
    /// Called at regular intervals while compressing.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards all progress notifications. Used when no callback is configured.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Tracks timing and emits batched callbacks.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    duration: Option<Duration>,
    frames_drawn: u64,
    position: Duration,
    batch_size: u64,
    start_time: Instant,
    frames_since_last_report: u64,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Arc<dyn ProgressCallback>, batch_size: u64) -> Self {
        Self {
            callback,
            duration: None,
            frames_drawn: 0,
            position: Duration::ZERO,
            batch_size: batch_size.max(1),
            start_time: Instant::now(),
            frames_since_last_report: 0,
        }
    }

    /// Record the source duration once the probe has produced it.
    pub(crate) fn set_duration(&mut self, duration: Duration) {
        self.duration = Some(duration);
    }

    /// Emit a report for a stage boundary regardless of batching.
    pub(crate) fn stage(&self, stage: CompressionStage) {
        self.report(stage);
    }

    /// Record one drawn frame and fire the callback if the batch threshold
    /// is reached.
    pub(crate) fn frame_drawn(&mut self, position: Duration) {
        self.frames_drawn += 1;
        self.position = position;
        self.frames_since_last_report += 1;

        if self.frames_since_last_report >= self.batch_size {
            self.report(CompressionStage::Encoding);
            self.frames_since_last_report = 0;
        }
    }

    fn report(&self, stage: CompressionStage) {
        let elapsed = self.start_time.elapsed();

        let fraction = self
            .duration
            .filter(|duration| !duration.is_zero())
            .map(|duration| {
                (self.position.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0)
            });

        let estimated_remaining = fraction
            .filter(|&fraction| fraction > 0.0)
            .map(|fraction| elapsed.mul_f64((1.0 - fraction) / fraction));

        let info = ProgressInfo {
            stage,
            frames_drawn: self.frames_drawn,
            position: self.position,
            duration: self.duration,
            percentage: fraction.map(|fraction| (fraction * 100.0) as f32),
            elapsed,
            estimated_remaining,
        };

        self.callback.on_progress(&info);
    }
}
