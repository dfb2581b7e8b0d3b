//! Collaborator contracts.
//!
//! The pipeline never touches a decoder, encoder or temporary file directly.
//! It drives three collaborators through these traits:
//!
//! - [`ByteStore`] turns caller bytes into a [`ByteReference`] a decoder can
//!   open, and releases it again.
//! - [`MediaDecoder`] loads the reference, reports metadata, plays, and
//!   presents frames one at a time.
//! - [`EncoderFactory`] starts a [`MediaEncoder`] that muxes resampled video
//!   and the source's audio into container bytes.
//!
//! The FFmpeg-backed implementations are [`TempFileStore`](crate::TempFileStore),
//! [`FfmpegDecoder`](crate::FfmpegDecoder) and
//! [`WebmEncoderFactory`](crate::WebmEncoderFactory). Every method reports
//! failures with the matching [`CompressError`] variant.

use std::path::Path;
use std::time::Duration;

use image::RgbImage;

use crate::error::CompressError;
use crate::metadata::RawMetadata;
use crate::mixer::{AudioSample, AudioTrackInfo, TrackLayout};
use crate::plan::CompressionPlan;
use crate::source::SourceMedia;

/// A temporary, openable reference to source bytes.
pub trait ByteReference {
    /// Location a decoder opens to read the bytes.
    fn location(&self) -> &Path;
}

/// Allocates and releases byte references.
pub trait ByteStore {
    /// The reference type handed to the decoder.
    type Reference: ByteReference;

    /// Make `source` openable by a decoder.
    ///
    /// Fails with [`CompressError::ResourceCreation`].
    fn create(&mut self, source: &SourceMedia) -> Result<Self::Reference, CompressError>;

    /// Release a reference. Must not fail; problems are logged.
    fn release(&mut self, reference: Self::Reference);
}

/// What the decoder shows at a frame-presentation point.
#[derive(Debug)]
pub enum Presentation<'a> {
    /// A new frame is on screen.
    Frame {
        /// The decoded frame at source resolution.
        image: &'a RgbImage,
        /// Playback position of the frame, relative to the stream start.
        position: Duration,
    },
    /// Playback reached the end of the stream.
    Ended,
    /// Playback is paused.
    Paused,
}

/// A source decoder with a playback clock.
///
/// Methods are called in order: [`load`](MediaDecoder::load),
/// [`audio_track`](MediaDecoder::audio_track), [`rewind`](MediaDecoder::rewind),
/// [`play`](MediaDecoder::play), then
/// [`next_presentation`](MediaDecoder::next_presentation) and
/// [`take_audio`](MediaDecoder::take_audio) once per tick.
/// [`pause`](MediaDecoder::pause) and [`detach`](MediaDecoder::detach) may be
/// called at any time, including before `load` completes.
#[allow(async_fn_in_trait)]
pub trait MediaDecoder {
    /// Open `location` and report its metadata.
    ///
    /// Fails with [`CompressError::Load`], carrying the decoder's native
    /// error code.
    async fn load(&mut self, location: &Path) -> Result<RawMetadata, CompressError>;

    /// The source's audio track, if it has one.
    fn audio_track(&self) -> Option<AudioTrackInfo>;

    /// Move the playback position to the start of the stream.
    fn rewind(&mut self);

    /// Start playback. Fails with [`CompressError::Playback`].
    async fn play(&mut self) -> Result<(), CompressError>;

    /// Wait for the next frame presentation.
    ///
    /// Decode faults after load are reported as [`CompressError::Load`].
    async fn next_presentation(&mut self) -> Result<Presentation<'_>, CompressError>;

    /// Audio samples demuxed since the last call, in presentation order.
    fn take_audio(&mut self) -> Vec<AudioSample>;

    /// Pause playback.
    fn pause(&mut self);

    /// Drop the loaded source and every decode resource.
    fn detach(&mut self);
}

/// Starts encoders for a compression.
pub trait EncoderFactory {
    /// The encoder type produced.
    type Encoder: MediaEncoder;

    /// Whether the encoder can carry `track`, copied as is or re-encoded.
    fn accepts_audio(&self, track: &AudioTrackInfo) -> bool;

    /// Start an encoder for `layout` at the plan's resolution and bitrate.
    ///
    /// Fails with [`CompressError::Encoder`].
    fn start(
        &mut self,
        layout: &TrackLayout,
        plan: &CompressionPlan,
    ) -> Result<Self::Encoder, CompressError>;
}

/// An incremental muxing encoder.
#[allow(async_fn_in_trait)]
pub trait MediaEncoder {
    /// Encode the output video frame with index `index` (at the plan's frame
    /// rate). `frame` is at the plan's target resolution.
    fn push_video(&mut self, index: u64, frame: &RgbImage) -> Result<(), CompressError>;

    /// Mux an audio sample, copied or re-encoded as the encoder decided
    /// when it started.
    fn push_audio(&mut self, sample: &AudioSample) -> Result<(), CompressError>;

    /// Container bytes produced since the last call.
    fn take_output(&mut self) -> Vec<u8>;

    /// Flush the encoder, finish the container, and return the remaining
    /// bytes.
    async fn stop(self) -> Result<Vec<u8>, CompressError>;
}
