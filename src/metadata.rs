//! Media metadata types.
//!
//! A decoder reports [`RawMetadata`] once the source has loaded. The probe
//! validates it into a [`MediaMetadata`], which the planner consumes and
//! nothing mutates afterwards.

use std::time::Duration;

use crate::error::CompressError;

/// Metadata exactly as a decoder reported it, before validation.
///
/// Decoders report an absent duration as `f64::NAN`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawMetadata {
    /// Duration in seconds. May be NaN, infinite, zero, or negative.
    pub duration_seconds: f64,
    /// Frame width in pixels. Zero when there is no video stream.
    pub width: u32,
    /// Frame height in pixels. Zero when there is no video stream.
    pub height: u32,
}

/// Validated metadata for a loaded source.
///
/// The duration is always finite and positive and both dimensions are
/// non-zero.
///
/// # Example
///
/// ```
/// use vidsqueeze::{MediaMetadata, RawMetadata};
///
/// let raw = RawMetadata { duration_seconds: 5.0, width: 1920, height: 1080 };
/// let metadata = MediaMetadata::try_from(raw).unwrap();
/// assert_eq!(metadata.width(), 1920);
///
/// let endless = RawMetadata { duration_seconds: f64::INFINITY, ..raw };
/// assert!(MediaMetadata::try_from(endless).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use]
pub struct MediaMetadata {
    duration_seconds: f64,
    width: u32,
    height: u32,
}

impl MediaMetadata {
    /// Duration in seconds.
    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    /// Duration as a [`Duration`].
    pub fn duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.duration_seconds).unwrap_or(Duration::MAX)
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }
}

impl TryFrom<RawMetadata> for MediaMetadata {
    type Error = CompressError;

    fn try_from(raw: RawMetadata) -> Result<Self, Self::Error> {
        let duration = raw.duration_seconds;
        if !duration.is_finite() || duration <= 0.0 {
            return Err(CompressError::InvalidDuration(duration));
        }
        if raw.width == 0 || raw.height == 0 {
            return Err(CompressError::InvalidDimensions {
                width: raw.width,
                height: raw.height,
            });
        }

        Ok(Self {
            duration_seconds: duration,
            width: raw.width,
            height: raw.height,
        })
    }
}
