//! FFmpeg initialisation and log level control.
//!
//! FFmpeg prints its own warnings to stderr, separately from the Rust-side
//! [`log`](https://crates.io/crates/log) messages this crate emits. Set
//! [`CompressOptions::with_ffmpeg_log_level`](crate::CompressOptions::with_ffmpeg_log_level)
//! to tune that output for a compression, or call [`set_ffmpeg_log_level`]
//! once at startup.
//!
//! # Example
//!
//! ```no_run
//! use vidsqueeze::FfmpegLogLevel;
//!
//! vidsqueeze::set_ffmpeg_log_level(FfmpegLogLevel::Error);
//! ```

use ffmpeg_next::util::log::Level;

/// FFmpeg internal log verbosity, from most quiet to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// Print nothing.
    Quiet,
    /// Unrecoverable errors only.
    Fatal,
    /// Recoverable errors.
    Error,
    /// Warnings (FFmpeg's default).
    Warning,
    /// Informational messages.
    Info,
    /// Debugging output.
    Debug,
}

impl From<FfmpegLogLevel> for Level {
    fn from(level: FfmpegLogLevel) -> Self {
        match level {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Debug => Level::Debug,
        }
    }
}

/// Set FFmpeg's internal log verbosity. Does not affect `log` crate output.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.into());
}

/// Initialise FFmpeg (idempotent) and apply an optional log level.
pub(crate) fn initialise(level: Option<FfmpegLogLevel>) -> Result<(), ffmpeg_next::Error> {
    ffmpeg_next::init()?;
    if let Some(level) = level {
        set_ffmpeg_log_level(level);
    }
    Ok(())
}
