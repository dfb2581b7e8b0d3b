//! The frame capture loop.
//!
//! [`FrameCaptureLoop`] is a small state machine driven by the decoder's
//! frame presentations:
//!
//! ```text
//! Idle ──begin──▶ Playing ──end of stream / paused──▶ Draining ──drain──▶ Stopped
//!                    │
//!                    └──running flag cleared──▶ Stopped
//! ```
//!
//! Each tick waits for one presentation, lets the mixer sample the buffer
//! for every output slot that elapsed, then resamples the new frame into the
//! [`FrameBuffer`]. Ticks are paced by the decoder, not by a timer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::backend::{MediaDecoder, MediaEncoder, Presentation};
use crate::encoder::{EncodedChunks, StreamEncoder};
use crate::error::CompressError;
use crate::frame::FrameBuffer;
use crate::mixer::TrackMixer;
use crate::plan::CompressionPlan;

/// Shared flag that keeps the capture loop running.
///
/// Clearing it from any clone makes the loop stop at its next tick without
/// drawing again.
///
/// # Example
///
/// ```
/// use vidsqueeze::RunningFlag;
///
/// let flag = RunningFlag::new();
/// let observer = flag.clone();
/// flag.start();
/// assert!(observer.is_running());
/// flag.clear();
/// assert!(!observer.is_running());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RunningFlag {
    running: Arc<AtomicBool>,
}

impl RunningFlag {
    /// Create a cleared flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag.
    pub fn start(&self) {
        self.running.store(true, Ordering::Release);
    }

    /// Clear the flag. Returns whether it was set.
    pub fn clear(&self) -> bool {
        self.running.swap(false, Ordering::AcqRel)
    }

    /// Whether the flag is set.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Capture loop states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Not started.
    Idle,
    /// Drawing one frame per presentation.
    Playing,
    /// No more frames will be drawn; the encoder is being finalised.
    Draining,
    /// Finished, normally or not.
    Stopped,
}

/// Why the loop left [`CaptureState::Playing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The source reached its end.
    EndOfStream,
    /// The source paused on its own. Nothing in the pipeline pauses it, so
    /// this is an anomaly, but it still ends the capture normally.
    Paused,
    /// The running flag was cleared.
    Interrupted,
}

/// Outcome of one [`FrameCaptureLoop::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// A frame at this playback position was drawn.
    Drew(Duration),
    /// The loop moved to [`CaptureState::Draining`].
    Draining(StopReason),
    /// The loop is stopped and drew nothing.
    Stopped,
}

/// Draws presented frames into the target-resolution buffer.
#[derive(Debug)]
pub struct FrameCaptureLoop {
    state: CaptureState,
    running: RunningFlag,
    buffer: FrameBuffer,
    stop_reason: Option<StopReason>,
}

impl FrameCaptureLoop {
    /// Create an idle loop drawing at the plan's target resolution.
    pub fn new(plan: &CompressionPlan, running: RunningFlag) -> Self {
        Self {
            state: CaptureState::Idle,
            running,
            buffer: FrameBuffer::new(plan.target_width, plan.target_height),
            stop_reason: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Why the loop stopped playing, once it has.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// The drawing surface.
    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    /// Move from idle to playing and set the running flag.
    ///
    /// Call once encoding and playback have both started.
    pub fn begin(&mut self) {
        if self.state == CaptureState::Idle {
            self.running.start();
            self.state = CaptureState::Playing;
        }
    }

    /// Wait for the next presentation and draw it.
    ///
    /// Audio demuxed alongside the frame is passed to the mixer. Outside
    /// [`CaptureState::Playing`] this returns immediately.
    pub async fn tick<D, E>(
        &mut self,
        decoder: &mut D,
        mixer: &mut TrackMixer,
        encoder: &mut StreamEncoder<E>,
    ) -> Result<Tick, CompressError>
    where
        D: MediaDecoder,
        E: MediaEncoder,
    {
        match self.state {
            CaptureState::Playing => {}
            CaptureState::Draining => {
                return Ok(Tick::Draining(
                    self.stop_reason.unwrap_or(StopReason::EndOfStream),
                ));
            }
            CaptureState::Idle | CaptureState::Stopped => return Ok(Tick::Stopped),
        }

        if !self.running.is_running() {
            return Ok(self.interrupt());
        }

        let presentation = decoder.next_presentation().await?;

        // The flag may have been cleared while we were suspended.
        if !self.running.is_running() {
            return Ok(self.interrupt());
        }

        let tick = match presentation {
            Presentation::Frame { image, position } => {
                mixer.advance_to(position, &self.buffer, encoder)?;
                self.buffer.draw(image);
                Tick::Drew(position)
            }
            Presentation::Ended => {
                log::info!("Video ended, stopping encoder");
                self.start_draining(StopReason::EndOfStream)
            }
            Presentation::Paused => {
                log::warn!("Video paused unexpectedly, stopping encoder");
                self.start_draining(StopReason::Paused)
            }
        };

        mixer.pass_audio(decoder.take_audio(), encoder)?;
        Ok(tick)
    }

    /// Pad the video track to `duration`, finalise the encoder and stop.
    pub async fn drain<E: MediaEncoder>(
        &mut self,
        duration: Duration,
        mixer: &mut TrackMixer,
        mut encoder: StreamEncoder<E>,
    ) -> Result<EncodedChunks, CompressError> {
        if self.state != CaptureState::Draining {
            return Err(CompressError::Encoder(format!(
                "cannot finalise while capture is {:?}",
                self.state
            )));
        }

        let padded = mixer.finish(duration, &self.buffer, &mut encoder);
        let result = match padded {
            Ok(_) => encoder.finalize().await,
            Err(error) => Err(error),
        };
        self.state = CaptureState::Stopped;
        result
    }

    fn start_draining(&mut self, reason: StopReason) -> Tick {
        self.state = CaptureState::Draining;
        self.stop_reason = Some(reason);
        Tick::Draining(reason)
    }

    fn interrupt(&mut self) -> Tick {
        log::info!("Capture stopped");
        self.state = CaptureState::Stopped;
        self.stop_reason = Some(StopReason::Interrupted);
        Tick::Stopped
    }
}
