//! Compression configuration.
//!
//! [`CompressOptions`] is a builder that threads the byte budget, timeouts,
//! plan limits and progress reporting through a compression without
//! widening every function signature. A default-constructed value behaves
//! exactly like [`compress`](crate::compress) with a 2 MB budget.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use vidsqueeze::{CompressOptions, Pacing};
//!
//! let options = CompressOptions::new()
//!     .with_max_size_mb(8.0)
//!     .with_load_timeout(Duration::from_secs(10))
//!     .with_pacing(Pacing::Unthrottled);
//! assert_eq!(options.max_size_mb(), 8.0);
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::ffmpeg::FfmpegLogLevel;
use crate::plan::PlanLimits;
use crate::progress::{NoOpProgress, ProgressCallback};

/// Default byte budget in megabytes.
pub const DEFAULT_MAX_SIZE_MB: f64 = 2.0;

/// Default time allowed for the source's metadata to arrive.
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Default interval between encoder output flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// How the FFmpeg decoder paces frame presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pacing {
    /// Present each frame when the playback clock reaches its timestamp.
    /// Compression takes as long as the source plays.
    #[default]
    RealTime,
    /// Present frames as fast as they decode, yielding to the runtime
    /// between frames.
    Unthrottled,
}

/// Settings for one compression.
#[derive(Clone)]
pub struct CompressOptions {
    pub(crate) max_size_mb: f64,
    pub(crate) load_timeout: Duration,
    pub(crate) flush_interval: Duration,
    pub(crate) limits: PlanLimits,
    pub(crate) pacing: Pacing,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    /// Fire the progress callback every N drawn frames.
    pub(crate) batch_size: u64,
    pub(crate) ffmpeg_log_level: Option<FfmpegLogLevel>,
    /// Where the FFmpeg backend writes the temporary source copy.
    pub(crate) temp_directory: Option<PathBuf>,
}

impl Debug for CompressOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("CompressOptions")
            .field("max_size_mb", &self.max_size_mb)
            .field("load_timeout", &self.load_timeout)
            .field("flush_interval", &self.flush_interval)
            .field("limits", &self.limits)
            .field("pacing", &self.pacing)
            .field("batch_size", &self.batch_size)
            .field("ffmpeg_log_level", &self.ffmpeg_log_level)
            .field("temp_directory", &self.temp_directory)
            .finish_non_exhaustive()
    }
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressOptions {
    /// Create options with the default 2 MB budget, 30 s load timeout,
    /// 100 ms flush interval, default plan limits and real-time pacing.
    pub fn new() -> Self {
        Self {
            max_size_mb: DEFAULT_MAX_SIZE_MB,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            limits: PlanLimits::default(),
            pacing: Pacing::default(),
            progress: Arc::new(NoOpProgress),
            batch_size: 1,
            ffmpeg_log_level: None,
            temp_directory: None,
        }
    }

    /// Set the byte budget in megabytes.
    #[must_use]
    pub fn with_max_size_mb(mut self, max_size_mb: f64) -> Self {
        self.max_size_mb = max_size_mb;
        self
    }

    /// Set how long to wait for the source's metadata.
    #[must_use]
    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    /// Set how often buffered encoder output is cut into a chunk.
    #[must_use]
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Override the planning limits.
    #[must_use]
    pub fn with_limits(mut self, limits: PlanLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Choose how the FFmpeg decoder paces playback.
    #[must_use]
    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Report progress every `size` drawn frames. Clamped to at least 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set FFmpeg's own console verbosity for this compression.
    #[must_use]
    pub fn with_ffmpeg_log_level(mut self, level: FfmpegLogLevel) -> Self {
        self.ffmpeg_log_level = Some(level);
        self
    }

    /// Write the temporary source copy into `directory` instead of the
    /// system temp directory.
    #[must_use]
    pub fn with_temp_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.temp_directory = Some(directory.into());
        self
    }

    /// The byte budget in megabytes.
    pub fn max_size_mb(&self) -> f64 {
        self.max_size_mb
    }

    /// The metadata load timeout.
    pub fn load_timeout(&self) -> Duration {
        self.load_timeout
    }

    /// The encoder flush interval.
    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// The planning limits.
    pub fn limits(&self) -> &PlanLimits {
        &self.limits
    }

    /// The playback pacing.
    pub fn pacing(&self) -> Pacing {
        self.pacing
    }
}
