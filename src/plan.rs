//! Target resolution and bitrate planning.
//!
//! [`CompressionPlan::calculate`] turns validated metadata and a byte budget
//! into the output resolution and video bitrate. It is a pure function with
//! no failure modes.
//!
//! The bitrate is a heuristic, not a size guarantee: very long sources clamp
//! to the floor bitrate and may overshoot the budget, very short ones clamp
//! to the ceiling and land well under it. The clamps bound visual quality;
//! budget accuracy is secondary.
//!
//! # Example
//!
//! ```
//! use vidsqueeze::{CompressionPlan, MediaMetadata, RawMetadata};
//!
//! let raw = RawMetadata { duration_seconds: 10.0, width: 1920, height: 1080 };
//! let metadata = MediaMetadata::try_from(raw)?;
//! let plan = CompressionPlan::calculate(&metadata, 2.0);
//!
//! assert_eq!((plan.target_width, plan.target_height), (720, 406));
//! assert_eq!(plan.target_bitrate, 1_677_721);
//! assert_eq!(plan.frame_rate, 25);
//! # Ok::<(), vidsqueeze::CompressError>(())
//! ```

use std::time::Duration;

use crate::metadata::MediaMetadata;

/// Bytes in one megabyte of budget.
const BYTES_PER_MEGABYTE: f64 = 1024.0 * 1024.0;

/// Bounds applied while planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanLimits {
    /// Cap on the longer output side, in pixels. Default 720.
    pub max_dimension: u32,
    /// Lowest bitrate ever chosen, in bits per second. Default 500 000.
    pub min_bitrate: u64,
    /// Highest bitrate ever chosen, in bits per second. Default 2 500 000.
    pub max_bitrate: u64,
    /// Output frame rate. Default 25.
    pub frame_rate: u32,
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self {
            max_dimension: 720,
            min_bitrate: 500_000,
            max_bitrate: 2_500_000,
            frame_rate: 25,
        }
    }
}

/// The output resolution and bitrate for one compression.
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use]
pub struct CompressionPlan {
    /// Source width in pixels.
    pub source_width: u32,
    /// Source height in pixels.
    pub source_height: u32,
    /// Output width in pixels; always even.
    pub target_width: u32,
    /// Output height in pixels; always even.
    pub target_height: u32,
    /// Average video bitrate in bits per second.
    pub target_bitrate: u64,
    /// Output frames per second.
    pub frame_rate: u32,
    /// Source duration. The output video track never runs past it.
    pub source_duration: Duration,
    /// The byte budget the bitrate was derived from, in megabytes.
    pub max_size_mb: f64,
}

impl CompressionPlan {
    /// Plan with the default [`PlanLimits`].
    pub fn calculate(metadata: &MediaMetadata, max_size_mb: f64) -> Self {
        Self::calculate_with(metadata, max_size_mb, &PlanLimits::default())
    }

    /// Plan with explicit limits.
    pub fn calculate_with(
        metadata: &MediaMetadata,
        max_size_mb: f64,
        limits: &PlanLimits,
    ) -> Self {
        let (target_width, target_height) =
            target_dimensions(metadata.width(), metadata.height(), limits.max_dimension);

        Self {
            source_width: metadata.width(),
            source_height: metadata.height(),
            target_width,
            target_height,
            target_bitrate: target_bitrate(metadata.duration_seconds(), max_size_mb, limits),
            frame_rate: limits.frame_rate.max(1),
            source_duration: metadata.duration(),
            max_size_mb,
        }
    }
}

/// Fit `width`×`height` inside `max_dimension` on the longer side, then
/// round both sides to even values.
pub fn target_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let (scaled_width, scaled_height) = if width > max_dimension || height > max_dimension {
        let max = f64::from(max_dimension);
        if width > height {
            let other = (f64::from(height) * max / f64::from(width)).round();
            (max_dimension, other as u32)
        } else {
            let other = (f64::from(width) * max / f64::from(height)).round();
            (other as u32, max_dimension)
        }
    } else {
        (width, height)
    };

    (round_to_even(scaled_width), round_to_even(scaled_height))
}

/// Bitrate that spends `max_size_mb` over `duration_seconds`, clamped to the
/// limits.
pub fn target_bitrate(duration_seconds: f64, max_size_mb: f64, limits: &PlanLimits) -> u64 {
    let raw = (max_size_mb * BYTES_PER_MEGABYTE * 8.0 / duration_seconds).floor();
    if raw.is_nan() || raw < limits.min_bitrate as f64 {
        return limits.min_bitrate;
    }
    (raw.min(limits.max_bitrate as f64) as u64).max(limits.min_bitrate)
}

/// Nearest multiple of two, halves rounding up, never below 2.
fn round_to_even(value: u32) -> u32 {
    let rounded = (f64::from(value) / 2.0).round() as u32 * 2;
    rounded.max(2)
}
