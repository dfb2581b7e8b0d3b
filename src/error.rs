//! Error types for the `vidsqueeze` crate.
//!
//! This module defines [`CompressError`], the single error type returned by
//! every fallible operation in the crate. Each variant is terminal for the
//! current compression: nothing is retried internally, and callers decide
//! whether to run the whole operation again.

use std::time::Duration;

use thiserror::Error;

/// The unified error type for all `vidsqueeze` operations.
///
/// A compression either fully succeeds or fails with exactly one of these
/// variants. Resource teardown has always run by the time a caller sees one.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompressError {
    /// The source reported a missing, infinite, non-positive, or NaN duration.
    #[error("Invalid video duration: {0}")]
    InvalidDuration(f64),

    /// The source reported a zero width or height (e.g. an audio-only file).
    #[error("Invalid video dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Reported frame width.
        width: u32,
        /// Reported frame height.
        height: u32,
    },

    /// The decoder failed to load the source.
    #[error("Failed to load video (code {code}): {message}")]
    Load {
        /// Native error code reported by the decoder.
        code: i32,
        /// Human-readable decoder message.
        message: String,
    },

    /// Metadata did not arrive before the load timeout expired.
    #[error("Timed out after {0:?} waiting for video metadata")]
    LoadTimeout(Duration),

    /// The decoder rejected the request to start playback.
    #[error("Failed to start video playback: {0}")]
    Playback(String),

    /// The encoder or container writer reported a fault.
    #[error("Encoder error: {0}")]
    Encoder(String),

    /// The encoded output could not be assembled into the final buffer.
    #[error("Failed to read compressed output: {0}")]
    OutputRead(String),

    /// The temporary byte reference for the source could not be created.
    #[error("Failed to create source reference: {0}")]
    ResourceCreation(String),
}

impl CompressError {
    /// Build a [`CompressError::Load`] from an FFmpeg error, keeping its
    /// native code.
    pub(crate) fn load(error: ffmpeg_next::Error) -> Self {
        CompressError::Load {
            code: i32::from(error),
            message: error.to_string(),
        }
    }
}
