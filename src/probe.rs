//! Source metadata probing.
//!
//! [`MediaProbe`] loads a source through a [`MediaDecoder`] and validates
//! what it reports. The load runs under a timeout; the timer is dropped as
//! soon as the decoder answers, whether the metadata turns out valid or not.

use std::path::Path;
use std::time::Duration;

use crate::backend::MediaDecoder;
use crate::error::CompressError;
use crate::metadata::MediaMetadata;

/// Loads a source and reports validated [`MediaMetadata`].
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
///
/// use vidsqueeze::{DEFAULT_LOAD_TIMEOUT, FfmpegDecoder, MediaProbe, Pacing};
///
/// # async fn run() -> Result<(), vidsqueeze::CompressError> {
/// let mut decoder = FfmpegDecoder::new(Pacing::Unthrottled);
/// let metadata =
///     MediaProbe::probe(&mut decoder, Path::new("input.mp4"), DEFAULT_LOAD_TIMEOUT).await?;
/// println!("{}x{}, {:.1}s", metadata.width(), metadata.height(), metadata.duration_seconds());
/// # Ok(())
/// # }
/// ```
pub struct MediaProbe;

impl MediaProbe {
    /// Load `location` into `decoder` and validate its metadata.
    ///
    /// # Errors
    ///
    /// - [`CompressError::LoadTimeout`] if the decoder does not answer within
    ///   `timeout`.
    /// - [`CompressError::Load`] if the decoder reports a load fault.
    /// - [`CompressError::InvalidDuration`] if the duration is missing,
    ///   infinite, zero, or negative.
    /// - [`CompressError::InvalidDimensions`] if either dimension is zero.
    pub async fn probe<D: MediaDecoder>(
        decoder: &mut D,
        location: &Path,
        timeout: Duration,
    ) -> Result<MediaMetadata, CompressError> {
        log::debug!("Loading {} (timeout {timeout:?})", location.display());

        let raw = match tokio::time::timeout(timeout, decoder.load(location)).await {
            Ok(loaded) => loaded?,
            Err(_) => {
                log::warn!("No metadata after {timeout:?}, giving up");
                return Err(CompressError::LoadTimeout(timeout));
            }
        };

        let metadata = MediaMetadata::try_from(raw)?;
        log::info!(
            "Video metadata: {}x{}, {:.2}s",
            metadata.width(),
            metadata.height(),
            metadata.duration_seconds()
        );
        Ok(metadata)
    }
}
