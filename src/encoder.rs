//! Incremental encoding into chunked container output.
//!
//! [`StreamEncoder`] wraps a [`MediaEncoder`] and cuts the bytes it produces
//! into [`EncodedChunks`] on a fixed wall-clock interval, so buffered output
//! never grows with the length of the video. Finalising concatenates the
//! chunks in arrival order.

use std::time::Duration;

use image::RgbImage;
use tokio::time::Instant;

use crate::backend::{EncoderFactory, MediaEncoder};
use crate::error::CompressError;
use crate::mixer::{AudioSample, TrackLayout};
use crate::plan::CompressionPlan;

/// Ordered, append-only container byte segments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedChunks {
    chunks: Vec<Vec<u8>>,
    total_bytes: usize,
}

impl EncodedChunks {
    /// Create an empty sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a segment. Empty segments are ignored.
    pub fn push(&mut self, chunk: Vec<u8>) {
        if chunk.is_empty() {
            return;
        }
        self.total_bytes += chunk.len();
        self.chunks.push(chunk);
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether no bytes have arrived.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total bytes across all segments.
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Iterate over the segments in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.chunks.iter().map(Vec::as_slice)
    }

    /// Concatenate every segment into one buffer.
    ///
    /// Fails with [`CompressError::OutputRead`] when the buffer cannot be
    /// allocated.
    pub fn assemble(self) -> Result<Vec<u8>, CompressError> {
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(self.total_bytes).map_err(|error| {
            CompressError::OutputRead(format!(
                "cannot allocate {} bytes: {error}",
                self.total_bytes
            ))
        })?;
        for chunk in self.chunks {
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }
}

/// Drives a [`MediaEncoder`] and collects its output in timed chunks.
pub struct StreamEncoder<E: MediaEncoder> {
    encoder: E,
    chunks: EncodedChunks,
    flush_interval: Duration,
    last_flush: Instant,
    video_frames: u64,
    audio_samples: u64,
}

impl<E: MediaEncoder> StreamEncoder<E> {
    /// Start an encoder for `layout` at the plan's resolution and bitrate.
    pub fn start<F>(
        encoders: &mut F,
        layout: &TrackLayout,
        plan: &CompressionPlan,
        flush_interval: Duration,
    ) -> Result<Self, CompressError>
    where
        F: EncoderFactory<Encoder = E>,
    {
        let encoder = encoders.start(layout, plan)?;
        log::debug!(
            "Encoder started: {}x{} @ {} fps, {} bps, audio={}",
            layout.video.width,
            layout.video.height,
            layout.video.frame_rate,
            plan.target_bitrate,
            layout.audio.is_some()
        );
        Ok(Self::new(encoder, flush_interval))
    }

    /// Wrap an already started encoder.
    pub fn new(encoder: E, flush_interval: Duration) -> Self {
        Self {
            encoder,
            chunks: EncodedChunks::new(),
            flush_interval,
            last_flush: Instant::now(),
            video_frames: 0,
            audio_samples: 0,
        }
    }

    /// Encode one output video frame.
    pub fn push_video(&mut self, index: u64, frame: &RgbImage) -> Result<(), CompressError> {
        self.encoder.push_video(index, frame)?;
        self.video_frames += 1;
        self.flush_if_due();
        Ok(())
    }

    /// Mux one audio sample.
    pub fn push_audio(&mut self, sample: &AudioSample) -> Result<(), CompressError> {
        self.encoder.push_audio(sample)?;
        self.audio_samples += 1;
        self.flush_if_due();
        Ok(())
    }

    /// Chunks collected so far.
    pub fn chunks(&self) -> &EncodedChunks {
        &self.chunks
    }

    /// Video frames encoded so far.
    pub fn video_frames(&self) -> u64 {
        self.video_frames
    }

    /// Move buffered output into a new chunk now.
    pub fn flush(&mut self) {
        let output = self.encoder.take_output();
        if !output.is_empty() {
            log::debug!(
                "Flushed chunk {} ({} bytes)",
                self.chunks.len() + 1,
                output.len()
            );
        }
        self.chunks.push(output);
        self.last_flush = Instant::now();
    }

    /// Finish the container and return every chunk, the trailing bytes
    /// last.
    pub async fn finalize(mut self) -> Result<EncodedChunks, CompressError> {
        self.flush();
        let trailer = self.encoder.stop().await?;
        self.chunks.push(trailer);
        log::debug!(
            "Encoder finalised: {} video frames, {} audio samples, {} chunks, {} bytes",
            self.video_frames,
            self.audio_samples,
            self.chunks.len(),
            self.chunks.total_bytes()
        );
        Ok(self.chunks)
    }

    fn flush_if_due(&mut self) {
        if self.last_flush.elapsed() >= self.flush_interval {
            self.flush();
        }
    }
}
