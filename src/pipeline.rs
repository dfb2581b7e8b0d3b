//! The compression pipeline.
//!
//! [`Compressor`] runs one compression end to end over a set of
//! collaborators:
//!
//! 1. allocate a byte reference for the source,
//! 2. load it and validate the metadata under the load timeout,
//! 3. plan the target resolution and bitrate,
//! 4. choose the output tracks and start the encoder,
//! 5. rewind, play, and draw one frame per presentation until the source
//!    ends,
//! 6. pad the video track, finalise the encoder, and assemble the bytes.
//!
//! Stages run strictly in that order on the calling task. A
//! [`LifecycleGuard`] releases the decoder and the byte reference on every
//! exit path, including when the returned future is dropped mid-flight.

use crate::backend::{ByteStore, EncoderFactory, MediaDecoder};
use crate::byte_store::TempFileStore;
use crate::capture::{FrameCaptureLoop, Tick};
use crate::configuration::CompressOptions;
use crate::encoder::StreamEncoder;
use crate::error::CompressError;
use crate::lifecycle::LifecycleGuard;
use crate::mixer::TrackMixer;
use crate::output::CompressionResult;
use crate::plan::CompressionPlan;
use crate::playback::FfmpegDecoder;
use crate::probe::MediaProbe;
use crate::progress::{CompressionStage, ProgressTracker};
use crate::source::SourceMedia;
use crate::webm::WebmEncoderFactory;

/// Compress `source_bytes` to a WebM of roughly `max_size_mb` megabytes.
///
/// Uses the FFmpeg backend with default options. The returned future
/// completes after the source has played through once, so a one-minute
/// video takes about a minute.
///
/// # Errors
///
/// Any [`CompressError`]; see the variants for when each occurs.
///
/// # Example
///
/// ```no_run
/// # async fn run() -> Result<(), vidsqueeze::CompressError> {
/// let bytes = std::fs::read("holiday.mp4").unwrap_or_default();
/// let result = vidsqueeze::compress(bytes, "holiday.mp4", "video/mp4", 2.0).await?;
/// assert_eq!(result.file_name, "holiday.webm");
/// println!("{:.1}% smaller", result.reduction_percent());
/// # Ok(())
/// # }
/// ```
pub async fn compress(
    source_bytes: impl Into<Vec<u8>>,
    source_name: &str,
    source_mime_type: &str,
    max_size_mb: f64,
) -> Result<CompressionResult, CompressError> {
    let source = SourceMedia::new(source_bytes, source_name, source_mime_type);
    let options = CompressOptions::new().with_max_size_mb(max_size_mb);
    compress_with_options(source, options).await
}

/// Compress `source` with the FFmpeg backend and explicit options.
pub async fn compress_with_options(
    source: SourceMedia,
    options: CompressOptions,
) -> Result<CompressionResult, CompressError> {
    Compressor::ffmpeg(options).run(source).await
}

/// Runs one compression over a byte store, a decoder and an encoder
/// factory.
///
/// # Example
///
/// ```no_run
/// use vidsqueeze::{CompressOptions, Compressor, SourceMedia};
///
/// # async fn run() -> Result<(), vidsqueeze::CompressError> {
/// let source = SourceMedia::new(Vec::new(), "clip.mov", "video/quicktime");
/// let result = Compressor::ffmpeg(CompressOptions::new().with_max_size_mb(5.0))
///     .run(source)
///     .await?;
/// println!("{} -> {} bytes", result.original_size, result.compressed_size);
/// # Ok(())
/// # }
/// ```
pub struct Compressor<S, D, F> {
    store: S,
    decoder: D,
    encoders: F,
    options: CompressOptions,
}

impl Compressor<TempFileStore, FfmpegDecoder, WebmEncoderFactory> {
    /// A compressor backed by temporary files, FFmpeg playback and the
    /// VP8/WebM encoder.
    pub fn ffmpeg(options: CompressOptions) -> Self {
        let store = match &options.temp_directory {
            Some(directory) => TempFileStore::in_directory(directory.clone()),
            None => TempFileStore::new(),
        };
        let decoder =
            FfmpegDecoder::new(options.pacing).with_ffmpeg_log_level(options.ffmpeg_log_level);
        Self::new(store, decoder, WebmEncoderFactory::new()).with_options(options)
    }
}

impl<S, D, F> Compressor<S, D, F>
where
    S: ByteStore,
    D: MediaDecoder,
    F: EncoderFactory,
{
    /// Combine collaborators with default options.
    pub fn new(store: S, decoder: D, encoders: F) -> Self {
        Self {
            store,
            decoder,
            encoders,
            options: CompressOptions::default(),
        }
    }

    /// Replace the options.
    #[must_use]
    pub fn with_options(mut self, options: CompressOptions) -> Self {
        self.options = options;
        self
    }

    /// The current options.
    pub fn options(&self) -> &CompressOptions {
        &self.options
    }

    /// Compress `source`. Resources are released before this returns.
    pub async fn run(self, source: SourceMedia) -> Result<CompressionResult, CompressError> {
        let Self {
            store,
            decoder,
            mut encoders,
            options,
        } = self;

        log::info!(
            "Compressing {} ({}, {} bytes) to {} MB",
            source.name(),
            source.mime_type(),
            source.byte_len(),
            options.max_size_mb
        );

        let mut guard = LifecycleGuard::new(store, decoder);
        let outcome = run_guarded(&mut guard, &mut encoders, &options, &source).await;
        guard.release();

        match &outcome {
            Ok(result) => log::info!(
                "Compressed {} to {}: {} -> {} bytes ({:.1}% reduction)",
                source.name(),
                result.file_name,
                result.original_size,
                result.compressed_size,
                result.reduction_percent()
            ),
            Err(error) => log::warn!("Compression of {} failed: {error}", source.name()),
        }
        outcome
    }
}

async fn run_guarded<S, D, F>(
    guard: &mut LifecycleGuard<S, D>,
    encoders: &mut F,
    options: &CompressOptions,
    source: &SourceMedia,
) -> Result<CompressionResult, CompressError>
where
    S: ByteStore,
    D: MediaDecoder,
    F: EncoderFactory,
{
    let mut progress = ProgressTracker::new(options.progress.clone(), options.batch_size);
    progress.stage(CompressionStage::Probing);

    let location = guard.allocate(source)?;
    let metadata = MediaProbe::probe(guard.decoder_mut(), &location, options.load_timeout).await?;
    progress.set_duration(metadata.duration());

    let plan = CompressionPlan::calculate_with(&metadata, options.max_size_mb, &options.limits);
    log::info!(
        "Compression plan: {}x{} -> {}x{} @ {} fps, {:.2}s, {} bps for {} MB",
        plan.source_width,
        plan.source_height,
        plan.target_width,
        plan.target_height,
        plan.frame_rate,
        metadata.duration_seconds(),
        plan.target_bitrate,
        plan.max_size_mb
    );

    let mut mixer = TrackMixer::new(&plan, guard.decoder().audio_track(), &*encoders);
    let mut encoder = StreamEncoder::<F::Encoder>::start(
        encoders,
        mixer.layout(),
        &plan,
        options.flush_interval,
    )?;

    let decoder = guard.decoder_mut();
    decoder.rewind();
    decoder.play().await?;

    let mut capture = FrameCaptureLoop::new(&plan, guard.running());
    capture.begin();
    progress.stage(CompressionStage::Encoding);

    loop {
        match capture
            .tick(guard.decoder_mut(), &mut mixer, &mut encoder)
            .await?
        {
            Tick::Drew(position) => progress.frame_drawn(position),
            Tick::Draining(reason) => {
                log::debug!("Capture finished: {reason:?}");
                break;
            }
            Tick::Stopped => {
                return Err(CompressError::Playback("capture interrupted".to_string()));
            }
        }
    }

    progress.stage(CompressionStage::Finalizing);
    let chunks = capture
        .drain(metadata.duration(), &mut mixer, encoder)
        .await?;
    guard.decoder_mut().pause();

    log::debug!(
        "Assembling {} chunks: {} video frames, {} audio samples",
        chunks.len(),
        mixer.video_frames(),
        mixer.audio_samples()
    );
    let bytes = chunks.assemble()?;
    Ok(CompressionResult::new(
        bytes,
        source.name(),
        source.byte_len(),
        plan,
    ))
}
