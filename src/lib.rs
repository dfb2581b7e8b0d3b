//! # vidsqueeze
//!
//! Squeeze a video under a byte budget: plan a resolution and bitrate from
//! the source's duration and dimensions, re-render every frame to VP8/WebM in
//! step with playback, and carry the original audio along.
//!
//! Decoding and encoding are powered by FFmpeg via the
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate. The pipeline
//! itself only talks to collaborator traits, so it runs just as well over
//! custom decoders and encoders.
//!
//! ## Quick Start
//!
//! ```no_run
//! # async fn run() -> Result<(), vidsqueeze::CompressError> {
//! let bytes = std::fs::read("holiday.mp4").unwrap_or_default();
//! let result = vidsqueeze::compress(bytes, "holiday.mp4", "video/mp4", 2.0).await?;
//! std::fs::write(&result.file_name, &result.bytes).ok();
//! # Ok(())
//! # }
//! ```
//!
//! ### With Options
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use vidsqueeze::{CompressOptions, FfmpegLogLevel, Pacing, SourceMedia};
//!
//! # async fn run() -> Result<(), vidsqueeze::CompressError> {
//! let source = SourceMedia::new(Vec::new(), "talk.mkv", "video/x-matroska");
//! let options = CompressOptions::new()
//!     .with_max_size_mb(8.0)
//!     .with_load_timeout(Duration::from_secs(10))
//!     .with_pacing(Pacing::Unthrottled)
//!     .with_ffmpeg_log_level(FfmpegLogLevel::Error);
//! let result = vidsqueeze::compress_with_options(source, options).await?;
//! println!("{:.1}% smaller", result.reduction_percent());
//! # Ok(())
//! # }
//! ```
//!
//! ## How it works
//!
//! - **Probe**: the source is loaded under a 30-second timeout and must
//!   report a finite, positive duration and non-zero dimensions.
//! - **Plan**: the longer side is capped at 720 pixels, both sides are
//!   rounded to even values, and the bitrate spends the budget over the
//!   duration within 0.5–2.5 Mbps.
//! - **Capture**: every presented frame is resampled into a target-size
//!   buffer, which is sampled at 25 fps for the encoder.
//! - **Mix and encode**: Opus or Vorbis audio is copied unchanged. Other
//!   decodable codecs are re-encoded to Opus, and anything else makes the
//!   output video-only. Output is cut into chunks every 100 ms and
//!   concatenated at the end.
//! - **Teardown**: the decoder and the temporary source copy are released on
//!   every exit path.
//!
//! The budget is a target, not a guarantee. Compression runs at playback
//! speed unless [`Pacing::Unthrottled`] is chosen.
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed, with libvpx enabled.
//! Re-encoding audio prefers libopus over FFmpeg's built-in Opus encoder.

pub mod backend;
pub mod byte_store;
pub mod capture;
pub mod configuration;
pub mod encoder;
pub mod error;
pub mod ffmpeg;
pub mod frame;
pub mod lifecycle;
pub mod metadata;
pub mod mixer;
pub mod output;
pub mod pipeline;
pub mod plan;
pub mod playback;
pub mod probe;
pub mod progress;
pub mod source;
mod transcode;
mod utilities;
pub mod webm;

pub use backend::{
    ByteReference, ByteStore, EncoderFactory, MediaDecoder, MediaEncoder, Presentation,
};
pub use byte_store::{TempFileReference, TempFileStore};
pub use capture::{CaptureState, FrameCaptureLoop, RunningFlag, StopReason, Tick};
pub use configuration::{
    CompressOptions, DEFAULT_FLUSH_INTERVAL, DEFAULT_LOAD_TIMEOUT, DEFAULT_MAX_SIZE_MB, Pacing,
};
pub use encoder::{EncodedChunks, StreamEncoder};
pub use error::CompressError;
pub use ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
pub use frame::FrameBuffer;
pub use lifecycle::LifecycleGuard;
pub use metadata::{MediaMetadata, RawMetadata};
pub use mixer::{AudioSample, AudioTrackInfo, TrackLayout, TrackMixer, VideoTrackInfo};
pub use output::{CompressionResult, OUTPUT_EXTENSION, OUTPUT_MIME_TYPE, output_file_name};
pub use pipeline::{Compressor, compress, compress_with_options};
pub use plan::{CompressionPlan, PlanLimits, target_bitrate, target_dimensions};
pub use playback::FfmpegDecoder;
pub use probe::MediaProbe;
pub use progress::{CompressionStage, ProgressCallback, ProgressInfo};
pub use source::SourceMedia;
pub use webm::{WebmEncoder, WebmEncoderFactory};
