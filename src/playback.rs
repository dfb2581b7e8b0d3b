//! FFmpeg-backed source playback.
//!
//! [`FfmpegDecoder`] demuxes a source file, decodes its best video stream to
//! RGB and presents each frame when the playback clock reaches its
//! timestamp. Packets of the best audio stream are queued untouched for the
//! mixer to pass on.
//!
//! Opening the source runs on a blocking thread so a stalled read (a pipe,
//! a slow network mount) cannot hold up the caller's load timeout. Packet
//! reads and decoding during playback run inline between frames.

use std::path::Path;
use std::time::Duration;

use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::decoder::Video as VideoDecoder;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::format::context::Input;
use ffmpeg_next::frame::Video as VideoFrame;
use ffmpeg_next::media::Type;
use ffmpeg_next::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use ffmpeg_next::{Error as FfmpegError, Packet, Rational, Stream};
use image::RgbImage;
use tokio::time::Instant;

use crate::backend::{MediaDecoder, Presentation};
use crate::configuration::Pacing;
use crate::error::CompressError;
use crate::ffmpeg::{self, FfmpegLogLevel};
use crate::metadata::RawMetadata;
use crate::mixer::{AudioSample, AudioTrackInfo};
use crate::utilities::{copy_frame_to_image, pts_to_duration};

/// FFmpeg's internal time base for container durations (microseconds).
const CONTAINER_TIME_BASE: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlaybackState {
    Detached,
    Loaded,
    Playing,
    Paused,
    Ended,
}

/// Where the decoder stands after advancing by one frame.
enum Advance {
    Frame(Duration),
    Ended,
}

struct AudioSource {
    stream_index: usize,
    start_pts: i64,
    info: AudioTrackInfo,
}

struct Session {
    input: Input,
    video_stream_index: usize,
    video_time_base: Rational,
    video_start_pts: i64,
    decoder: VideoDecoder,
    scaler: Option<ScalingContext>,
    decoded_frame: VideoFrame,
    rgb_frame: VideoFrame,
    image: RgbImage,
    audio: Option<AudioSource>,
    pending_audio: Vec<AudioSample>,
    eof_sent: bool,
    clock: Option<Instant>,
    duration: Option<Duration>,
}

/// Plays a source file through FFmpeg.
///
/// # Example
///
/// ```no_run
/// use vidsqueeze::{
///     CompressOptions, Compressor, FfmpegDecoder, Pacing, SourceMedia, TempFileStore,
///     WebmEncoderFactory,
/// };
///
/// # async fn run() -> Result<(), vidsqueeze::CompressError> {
/// let bytes = std::fs::read("input.mp4").unwrap_or_default();
/// let result = Compressor::new(
///     TempFileStore::new(),
///     FfmpegDecoder::new(Pacing::Unthrottled),
///     WebmEncoderFactory::new(),
/// )
/// .with_options(CompressOptions::new().with_max_size_mb(4.0))
/// .run(SourceMedia::new(bytes, "input.mp4", "video/mp4"))
/// .await?;
/// println!("{} bytes", result.compressed_size);
/// # Ok(())
/// # }
/// ```
pub struct FfmpegDecoder {
    pacing: Pacing,
    log_level: Option<FfmpegLogLevel>,
    state: PlaybackState,
    session: Option<Session>,
}

impl FfmpegDecoder {
    /// Create a decoder with nothing loaded.
    pub fn new(pacing: Pacing) -> Self {
        Self {
            pacing,
            log_level: None,
            state: PlaybackState::Detached,
            session: None,
        }
    }

    /// Apply an FFmpeg log level when the first source is loaded.
    #[must_use]
    pub fn with_ffmpeg_log_level(mut self, level: Option<FfmpegLogLevel>) -> Self {
        self.log_level = level;
        self
    }

    /// The configured pacing.
    pub fn pacing(&self) -> Pacing {
        self.pacing
    }

    async fn advance(&mut self) -> Result<Advance, CompressError> {
        let pacing = self.pacing;
        let Some(session) = self.session.as_mut() else {
            return Ok(Advance::Ended);
        };

        loop {
            if session.decoder.receive_frame(&mut session.decoded_frame).is_ok() {
                session.convert_frame()?;
                let position = session.frame_position();
                session.wait_until(position, pacing).await;
                return Ok(Advance::Frame(position));
            }

            // The decoder is drained and has no more frames after EOF.
            if session.eof_sent {
                return Ok(Advance::Ended);
            }

            let mut packet = Packet::empty();
            match packet.read(&mut session.input) {
                Ok(()) => session.route_packet(&packet)?,
                Err(FfmpegError::Eof) => {
                    session.decoder.send_eof().map_err(CompressError::load)?;
                    session.eof_sent = true;
                }
                Err(error) => return Err(CompressError::load(error)),
            }
        }
    }
}

impl MediaDecoder for FfmpegDecoder {
    async fn load(&mut self, location: &Path) -> Result<RawMetadata, CompressError> {
        ffmpeg::initialise(self.log_level).map_err(CompressError::load)?;
        self.detach();

        let path = location.to_path_buf();
        let input = tokio::task::spawn_blocking(move || ffmpeg_next::format::input(&path))
            .await
            .map_err(|error| CompressError::Playback(format!("source open task failed: {error}")))?
            .map_err(CompressError::load)?;

        let duration_seconds = match input.duration() {
            ffmpeg_sys_next::AV_NOPTS_VALUE => f64::NAN,
            duration => duration as f64 / CONTAINER_TIME_BASE,
        };

        let Some(video_stream) = input.streams().best(Type::Video) else {
            log::warn!("{} has no video stream", location.display());
            return Ok(RawMetadata {
                duration_seconds,
                width: 0,
                height: 0,
            });
        };
        let video_stream_index = video_stream.index();
        let video_time_base = video_stream.time_base();
        let video_start_pts = start_pts(&video_stream);

        let decoder = CodecContext::from_parameters(video_stream.parameters())
            .and_then(|context| context.decoder().video())
            .map_err(CompressError::load)?;
        let width = decoder.width();
        let height = decoder.height();

        let audio = input.streams().best(Type::Audio).map(|stream| AudioSource {
            stream_index: stream.index(),
            start_pts: start_pts(&stream),
            info: audio_track_info(&stream),
        });

        log::debug!(
            "Loaded {}: video stream {video_stream_index} ({width}x{height}), audio {:?}",
            location.display(),
            audio.as_ref().map(|audio| &audio.info.codec)
        );

        self.session = Some(Session {
            input,
            video_stream_index,
            video_time_base,
            video_start_pts,
            decoder,
            scaler: None,
            decoded_frame: VideoFrame::empty(),
            rgb_frame: VideoFrame::empty(),
            image: RgbImage::new(0, 0),
            audio,
            pending_audio: Vec::new(),
            eof_sent: false,
            clock: None,
            duration: (duration_seconds.is_finite() && duration_seconds > 0.0)
                .then(|| Duration::from_secs_f64(duration_seconds)),
        });
        self.state = PlaybackState::Loaded;

        Ok(RawMetadata {
            duration_seconds,
            width,
            height,
        })
    }

    fn audio_track(&self) -> Option<AudioTrackInfo> {
        self.session
            .as_ref()
            .and_then(|session| session.audio.as_ref())
            .map(|audio| audio.info.clone())
    }

    fn rewind(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if let Err(error) = session.input.seek(0, ..0) {
            log::debug!("Seek to start failed, continuing from current position: {error}");
        }
        session.decoder.flush();
        session.pending_audio.clear();
        session.eof_sent = false;
        session.clock = None;
        self.state = PlaybackState::Loaded;
    }

    async fn play(&mut self) -> Result<(), CompressError> {
        let Some(session) = self.session.as_mut() else {
            return Err(CompressError::Playback("no source loaded".to_string()));
        };
        if self.state == PlaybackState::Ended {
            return Err(CompressError::Playback(
                "source already ended; rewind first".to_string(),
            ));
        }
        session.clock = Some(Instant::now());
        self.state = PlaybackState::Playing;
        log::info!("Playback started ({:?})", self.pacing);
        Ok(())
    }

    async fn next_presentation(&mut self) -> Result<Presentation<'_>, CompressError> {
        match self.state {
            PlaybackState::Playing => {}
            PlaybackState::Ended | PlaybackState::Detached => return Ok(Presentation::Ended),
            PlaybackState::Loaded | PlaybackState::Paused => return Ok(Presentation::Paused),
        }

        match self.advance().await? {
            Advance::Frame(position) => match self.session.as_ref() {
                Some(session) => Ok(Presentation::Frame {
                    image: &session.image,
                    position,
                }),
                None => Ok(Presentation::Ended),
            },
            Advance::Ended => {
                self.state = PlaybackState::Ended;
                Ok(Presentation::Ended)
            }
        }
    }

    fn take_audio(&mut self) -> Vec<AudioSample> {
        self.session
            .as_mut()
            .map(|session| std::mem::take(&mut session.pending_audio))
            .unwrap_or_default()
    }

    fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
            if let Some(session) = self.session.as_mut() {
                session.clock = None;
            }
        }
    }

    fn detach(&mut self) {
        if self.session.take().is_some() {
            log::debug!("Decoder detached");
        }
        self.state = PlaybackState::Detached;
    }
}

impl Session {
    /// Convert the decoded frame to packed RGB at source resolution.
    fn convert_frame(&mut self) -> Result<(), CompressError> {
        let format = self.decoded_frame.format();
        let width = self.decoded_frame.width();
        let height = self.decoded_frame.height();

        let stale = self.scaler.as_ref().is_none_or(|scaler| {
            scaler.input().format != format
                || scaler.input().width != width
                || scaler.input().height != height
        });
        if stale {
            let scaler = ScalingContext::get(
                format,
                width,
                height,
                Pixel::RGB24,
                width,
                height,
                ScalingFlags::BILINEAR,
            )
            .map_err(CompressError::load)?;
            self.scaler = Some(scaler);
        }

        if let Some(scaler) = self.scaler.as_mut() {
            scaler
                .run(&self.decoded_frame, &mut self.rgb_frame)
                .map_err(CompressError::load)?;
        }
        copy_frame_to_image(&self.rgb_frame, &mut self.image);
        Ok(())
    }

    /// Position of the decoded frame relative to the stream start.
    fn frame_position(&self) -> Duration {
        let pts = self
            .decoded_frame
            .timestamp()
            .or_else(|| self.decoded_frame.pts())
            .unwrap_or(self.video_start_pts);
        pts_to_duration(pts - self.video_start_pts, self.video_time_base)
    }

    /// Sleep until `position` on the playback clock. Positions past the
    /// container duration wait no longer than the duration itself.
    async fn wait_until(&self, position: Duration, pacing: Pacing) {
        let position = match self.duration {
            Some(duration) => position.min(duration),
            None => position,
        };
        let deadline = match pacing {
            Pacing::RealTime => self.clock.and_then(|clock| clock.checked_add(position)),
            Pacing::Unthrottled => None,
        };
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => tokio::task::yield_now().await,
        }
    }

    /// Send video packets to the decoder and queue audio packets.
    fn route_packet(&mut self, packet: &Packet) -> Result<(), CompressError> {
        let stream_index = packet.stream();
        if stream_index == self.video_stream_index {
            return self.decoder.send_packet(packet).map_err(CompressError::load);
        }

        let Some(audio) = self.audio.as_ref() else {
            return Ok(());
        };
        if stream_index != audio.stream_index {
            return Ok(());
        }
        let (Some(pts), Some(data)) = (packet.pts().or(packet.dts()), packet.data()) else {
            log::debug!("Skipping audio packet without timestamp or payload");
            return Ok(());
        };
        self.pending_audio.push(AudioSample {
            pts: pts - audio.start_pts,
            duration: packet.duration(),
            data: data.to_vec(),
            keyframe: packet.is_key(),
        });
        Ok(())
    }
}

fn start_pts(stream: &Stream) -> i64 {
    match stream.start_time() {
        ffmpeg_sys_next::AV_NOPTS_VALUE => 0,
        start => start,
    }
}

fn audio_track_info(stream: &Stream) -> AudioTrackInfo {
    let parameters = stream.parameters();
    let time_base = stream.time_base();

    // SAFETY: the parameters belong to a stream of the open input and stay
    // valid for the duration of this borrow; extradata is only read when the
    // pointer is non-null and the size positive.
    let (sample_rate, channels, extradata, block_align, bits_per_coded_sample) = unsafe {
        let raw = parameters.as_ptr();
        let extradata = if (*raw).extradata.is_null() || (*raw).extradata_size <= 0 {
            Vec::new()
        } else {
            std::slice::from_raw_parts((*raw).extradata, (*raw).extradata_size as usize).to_vec()
        };
        (
            (*raw).sample_rate,
            (*raw).ch_layout.nb_channels,
            extradata,
            (*raw).block_align,
            (*raw).bits_per_coded_sample,
        )
    };

    AudioTrackInfo {
        codec: parameters.id().name().to_string(),
        sample_rate: u32::try_from(sample_rate).unwrap_or(0),
        channels: u16::try_from(channels).unwrap_or(0),
        time_base: (time_base.numerator(), time_base.denominator()),
        extradata,
        block_align: u32::try_from(block_align).unwrap_or(0),
        bits_per_coded_sample: u32::try_from(bits_per_coded_sample).unwrap_or(0),
    }
}
