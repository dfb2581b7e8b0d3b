//! Combining resampled video with the original audio.
//!
//! [`TrackMixer`] decides which tracks the output carries and feeds both of
//! them into the [`StreamEncoder`]. Video is mandatory: output frames are
//! sampled from the [`FrameBuffer`] at the plan's fixed frame rate, so the
//! output frame `k` shows whatever the buffer held at time `k / frame_rate`.
//! Audio is best-effort: the encoder either copies it or re-encodes it to
//! a codec its container accepts.

use std::time::Duration;

use crate::backend::{EncoderFactory, MediaEncoder};
use crate::encoder::StreamEncoder;
use crate::error::CompressError;
use crate::frame::FrameBuffer;
use crate::plan::CompressionPlan;

/// Description of the output video track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoTrackInfo {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frames per second.
    pub frame_rate: u32,
}

/// Description of a source audio track, enough to copy it unchanged or to
/// open a decoder for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrackInfo {
    /// Codec name as FFmpeg spells it (e.g. `"opus"`, `"aac"`).
    pub codec: String,
    /// Sample rate in hertz.
    pub sample_rate: u32,
    /// Channel count. Zero means the source exposes no usable audio.
    pub channels: u16,
    /// Time base of [`AudioSample`] timestamps, as `(numerator, denominator)`.
    pub time_base: (i32, i32),
    /// Codec-private setup data (e.g. the Opus header).
    pub extradata: Vec<u8>,
    /// Bytes per coded block, for codecs that need it. Zero if unknown.
    pub block_align: u32,
    /// Bits per coded sample, for PCM-like codecs. Zero if unknown.
    pub bits_per_coded_sample: u32,
}

/// One compressed audio packet from the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSample {
    /// Presentation timestamp in the track's time base, relative to the
    /// stream start.
    pub pts: i64,
    /// Duration in the track's time base.
    pub duration: i64,
    /// Compressed payload.
    pub data: Vec<u8>,
    /// Whether the packet can be decoded independently.
    pub keyframe: bool,
}

/// The tracks an output carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackLayout {
    /// Always present.
    pub video: VideoTrackInfo,
    /// Present iff the source has audio the encoder can carry, copied or
    /// re-encoded.
    pub audio: Option<AudioTrackInfo>,
}

/// Multiplexes resampled video frames and source audio into the encoder.
#[derive(Debug)]
pub struct TrackMixer {
    layout: TrackLayout,
    next_video_index: u64,
    last_video_slot: u64,
    overrun_reported: bool,
    audio_samples: u64,
    dropped_audio_samples: u64,
}

impl TrackMixer {
    /// Choose the output tracks for `plan` and the source's `audio` track.
    ///
    /// Audio is left out, without error, when the source has none, reports
    /// zero channels, or uses a codec `encoders` cannot carry.
    pub fn new<F: EncoderFactory>(
        plan: &CompressionPlan,
        audio: Option<AudioTrackInfo>,
        encoders: &F,
    ) -> Self {
        let audio = match audio {
            None => {
                log::info!("No audio track in source, output will be video-only");
                None
            }
            Some(track) if track.channels == 0 => {
                log::info!("Source audio track has no channels, output will be video-only");
                None
            }
            Some(track) if !encoders.accepts_audio(&track) => {
                log::warn!(
                    "Audio codec {} cannot be carried, output will be video-only",
                    track.codec
                );
                None
            }
            Some(track) => {
                log::info!(
                    "Carrying {} audio ({} Hz, {} channels)",
                    track.codec,
                    track.sample_rate,
                    track.channels
                );
                Some(track)
            }
        };

        let frame_rate = plan.frame_rate.max(1);
        Self {
            layout: TrackLayout {
                video: VideoTrackInfo {
                    width: plan.target_width,
                    height: plan.target_height,
                    frame_rate,
                },
                audio,
            },
            next_video_index: 0,
            last_video_slot: slots_before(plan.source_duration, frame_rate),
            overrun_reported: false,
            audio_samples: 0,
            dropped_audio_samples: 0,
        }
    }

    /// The chosen output tracks.
    pub fn layout(&self) -> &TrackLayout {
        &self.layout
    }

    /// Whether the output carries audio.
    pub fn has_audio(&self) -> bool {
        self.layout.audio.is_some()
    }

    /// Output video frames emitted so far.
    pub fn video_frames(&self) -> u64 {
        self.next_video_index
    }

    /// Audio samples passed to the encoder so far.
    pub fn audio_samples(&self) -> u64 {
        self.audio_samples
    }

    /// Emit the buffer's current content for every output frame slot that
    /// starts before `position`.
    ///
    /// Call this before drawing the frame presented at `position`. Nothing is
    /// emitted until the buffer has been drawn at least once, so the first
    /// source frame also covers the slots before its timestamp. Positions
    /// past the source duration only fill the slots up to the duration.
    pub fn advance_to<E: MediaEncoder>(
        &mut self,
        position: Duration,
        buffer: &FrameBuffer,
        encoder: &mut StreamEncoder<E>,
    ) -> Result<u64, CompressError> {
        if buffer.draws() == 0 {
            return Ok(0);
        }
        let mut target = self.slots_before(position);
        if target > self.last_video_slot {
            if !self.overrun_reported {
                log::warn!("Frame at {position:?} lies past the source duration, clamping");
                self.overrun_reported = true;
            }
            target = self.last_video_slot;
        }
        self.emit_until(target, buffer, encoder)
    }

    /// Pass source audio samples through, or drop them when the output is
    /// video-only.
    pub fn pass_audio<E: MediaEncoder>(
        &mut self,
        samples: Vec<AudioSample>,
        encoder: &mut StreamEncoder<E>,
    ) -> Result<(), CompressError> {
        if self.layout.audio.is_none() {
            self.dropped_audio_samples += samples.len() as u64;
            return Ok(());
        }
        for sample in &samples {
            encoder.push_audio(sample)?;
            self.audio_samples += 1;
        }
        Ok(())
    }

    /// Pad the video track with the last drawn frame up to `duration`.
    ///
    /// The last drawn frame is always emitted at least once, even when the
    /// reported duration is shorter than its position.
    pub fn finish<E: MediaEncoder>(
        &mut self,
        duration: Duration,
        buffer: &FrameBuffer,
        encoder: &mut StreamEncoder<E>,
    ) -> Result<u64, CompressError> {
        if buffer.draws() == 0 {
            log::warn!("Source presented no frames, output has an empty video track");
            return Ok(0);
        }
        let target = self.slots_before(duration).max(self.next_video_index + 1);
        let emitted = self.emit_until(target, buffer, encoder)?;

        if self.dropped_audio_samples > 0 {
            log::debug!("Dropped {} audio samples", self.dropped_audio_samples);
        }
        Ok(emitted)
    }

    fn slots_before(&self, time: Duration) -> u64 {
        slots_before(time, self.layout.video.frame_rate)
    }

    fn emit_until<E: MediaEncoder>(
        &mut self,
        target: u64,
        buffer: &FrameBuffer,
        encoder: &mut StreamEncoder<E>,
    ) -> Result<u64, CompressError> {
        let start = self.next_video_index;
        while self.next_video_index < target {
            encoder.push_video(self.next_video_index, buffer.image())?;
            self.next_video_index += 1;
        }
        Ok(self.next_video_index - start)
    }
}

/// Number of slots `k` with `k / frame_rate < time`.
fn slots_before(time: Duration, frame_rate: u32) -> u64 {
    let slots = (time.as_nanos() * u128::from(frame_rate)).div_ceil(1_000_000_000);
    u64::try_from(slots).unwrap_or(u64::MAX)
}
