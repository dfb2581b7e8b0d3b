//! VP8/WebM encoding into memory.
//!
//! [`WebmEncoderFactory`] starts a [`WebmEncoder`] that encodes RGB frames to
//! VP8 and muxes them into a WebM container. Opus and Vorbis packets are
//! copied as they are. Other audio is re-encoded to Opus. The muxer writes
//! into an FFmpeg dynamic buffer that is swapped for a fresh one every time
//! output is taken, so container bytes leave FFmpeg in arrival order without
//! ever touching the filesystem.

use std::ffi::CString;

use ffmpeg_next::codec::Id;
use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::encoder::video::Encoder as VideoEncoder;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::frame::Video as VideoFrame;
use ffmpeg_next::packet::Flags as PacketFlags;
use ffmpeg_next::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use ffmpeg_next::{Dictionary, Error as FfmpegError, Packet, Rational};
use ffmpeg_sys_next::{AVFormatContext, AVRational};
use image::RgbImage;

use crate::backend::{EncoderFactory, MediaEncoder};
use crate::error::CompressError;
use crate::mixer::{AudioSample, AudioTrackInfo, TrackLayout};
use crate::plan::CompressionPlan;
use crate::transcode::{self, OpusTranscoder, PacketWriter};
use crate::utilities::copy_image_to_frame;

const CONTAINER: &str = "webm";
const PASSTHROUGH_AUDIO_CODECS: [&str; 2] = ["opus", "vorbis"];
const VIDEO_STREAM: usize = 0;
const AUDIO_STREAM: usize = 1;

/// Starts VP8/WebM encoders.
#[derive(Debug, Clone)]
pub struct WebmEncoderFactory {
    cpu_used: u8,
    keyframe_interval_seconds: u32,
}

impl Default for WebmEncoderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl WebmEncoderFactory {
    /// Real-time VP8 at speed 8 with a keyframe every two seconds.
    pub fn new() -> Self {
        Self {
            cpu_used: 8,
            keyframe_interval_seconds: 2,
        }
    }

    /// Set libvpx's `cpu-used` speed (0 is slowest and best, 16 fastest).
    #[must_use]
    pub fn with_cpu_used(mut self, cpu_used: u8) -> Self {
        self.cpu_used = cpu_used.min(16);
        self
    }

    /// Set the maximum distance between keyframes in seconds.
    #[must_use]
    pub fn with_keyframe_interval(mut self, seconds: u32) -> Self {
        self.keyframe_interval_seconds = seconds.max(1);
        self
    }
}

impl EncoderFactory for WebmEncoderFactory {
    type Encoder = WebmEncoder;

    fn accepts_audio(&self, track: &AudioTrackInfo) -> bool {
        is_passthrough(track) || transcode::can_transcode(track)
    }

    fn start(
        &mut self,
        layout: &TrackLayout,
        plan: &CompressionPlan,
    ) -> Result<WebmEncoder, CompressError> {
        let video = &layout.video;
        let frame_rate = i32::try_from(video.frame_rate).map_err(|_| {
            CompressError::Encoder(format!("frame rate {} too high", video.frame_rate))
        })?;
        let encoder_time_base = Rational::new(1, frame_rate);

        let mut output = MemoryOutput::new(CONTAINER)?;

        let codec = ffmpeg_next::encoder::find(Id::VP8)
            .ok_or_else(|| CompressError::Encoder("VP8 encoder not available".to_string()))?;
        let mut context = CodecContext::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(|error| encoder_error("cannot create VP8 context", error))?;
        context.set_width(video.width);
        context.set_height(video.height);
        context.set_format(Pixel::YUV420P);
        context.set_time_base(encoder_time_base);
        context.set_frame_rate(Some(Rational::new(frame_rate, 1)));
        context.set_bit_rate(usize::try_from(plan.target_bitrate).unwrap_or(usize::MAX));
        context.set_gop(video.frame_rate.saturating_mul(self.keyframe_interval_seconds));
        if output.needs_global_header() {
            // SAFETY: the context is allocated and not yet opened.
            unsafe {
                (*context.as_mut_ptr()).flags |=
                    ffmpeg_sys_next::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
            }
        }

        let mut options = Dictionary::new();
        options.set("deadline", "realtime");
        options.set("cpu-used", &self.cpu_used.to_string());
        let encoder = context
            .open_as_with(codec, options)
            .map_err(|error| encoder_error("cannot open VP8 encoder", error))?;

        output.add_encoded_stream(&encoder, encoder_time_base, "video")?;
        let audio = match &layout.audio {
            Some(track) if is_passthrough(track) => {
                output.add_copied_stream(track)?;
                Some(AudioOutput::Copy {
                    source_time_base: Rational::new(track.time_base.0, track.time_base.1),
                })
            }
            Some(track) => {
                let transcoder =
                    OpusTranscoder::new(track, output.needs_global_header(), AUDIO_STREAM)?;
                output.add_encoded_stream(
                    transcoder.encoder(),
                    transcoder.time_base(),
                    "audio",
                )?;
                Some(AudioOutput::Transcode(Box::new(transcoder)))
            }
            None => None,
        };
        output.write_header()?;

        let scaler = ScalingContext::get(
            Pixel::RGB24,
            video.width,
            video.height,
            Pixel::YUV420P,
            video.width,
            video.height,
            ScalingFlags::BILINEAR,
        )
        .map_err(|error| encoder_error("cannot create colour converter", error))?;

        log::debug!(
            "VP8 encoder opened: {}x{}, {} bps, cpu-used {}",
            video.width,
            video.height,
            plan.target_bitrate,
            self.cpu_used
        );

        Ok(WebmEncoder {
            output,
            encoder,
            encoder_time_base,
            audio,
            scaler,
            rgb_frame: VideoFrame::new(Pixel::RGB24, video.width, video.height),
            yuv_frame: VideoFrame::empty(),
            packet: Packet::empty(),
        })
    }
}

/// How the audio track reaches the muxer.
enum AudioOutput {
    Copy { source_time_base: Rational },
    Transcode(Box<OpusTranscoder>),
}

/// Encodes one output file. Created by [`WebmEncoderFactory`].
pub struct WebmEncoder {
    output: MemoryOutput,
    encoder: VideoEncoder,
    encoder_time_base: Rational,
    audio: Option<AudioOutput>,
    scaler: ScalingContext,
    rgb_frame: VideoFrame,
    yuv_frame: VideoFrame,
    packet: Packet,
}

impl WebmEncoder {
    fn write_encoded_video(&mut self) -> Result<(), CompressError> {
        let stream_time_base = self.output.time_base(VIDEO_STREAM);
        while self.encoder.receive_packet(&mut self.packet).is_ok() {
            self.packet.set_stream(VIDEO_STREAM);
            self.packet.rescale_ts(self.encoder_time_base, stream_time_base);
            self.output.write(&mut self.packet)?;
        }
        Ok(())
    }
}

impl MediaEncoder for WebmEncoder {
    fn push_video(&mut self, index: u64, frame: &RgbImage) -> Result<(), CompressError> {
        if frame.dimensions() != (self.rgb_frame.width(), self.rgb_frame.height()) {
            return Err(CompressError::Encoder(format!(
                "frame is {}x{}, encoder expects {}x{}",
                frame.width(),
                frame.height(),
                self.rgb_frame.width(),
                self.rgb_frame.height()
            )));
        }

        copy_image_to_frame(frame, &mut self.rgb_frame);
        self.scaler
            .run(&self.rgb_frame, &mut self.yuv_frame)
            .map_err(|error| encoder_error("colour conversion failed", error))?;
        self.yuv_frame
            .set_pts(Some(i64::try_from(index).unwrap_or(i64::MAX)));
        self.encoder
            .send_frame(&self.yuv_frame)
            .map_err(|error| encoder_error("send_frame failed", error))?;
        self.write_encoded_video()
    }

    fn push_audio(&mut self, sample: &AudioSample) -> Result<(), CompressError> {
        let stream_time_base = self.output.time_base(AUDIO_STREAM);
        match self.audio.as_mut() {
            Some(AudioOutput::Copy { source_time_base }) => {
                let mut packet = Packet::copy(&sample.data);
                packet.set_pts(Some(sample.pts));
                packet.set_dts(Some(sample.pts));
                packet.set_duration(sample.duration);
                if sample.keyframe {
                    packet.set_flags(PacketFlags::KEY);
                }
                packet.set_stream(AUDIO_STREAM);
                packet.rescale_ts(*source_time_base, stream_time_base);
                self.output.write(&mut packet)
            }
            Some(AudioOutput::Transcode(transcoder)) => {
                transcoder.push(sample, stream_time_base, &mut self.output)
            }
            None => Err(CompressError::Encoder(
                "audio sample for a video-only output".to_string(),
            )),
        }
    }

    fn take_output(&mut self) -> Vec<u8> {
        let bytes = self.output.take_bytes();
        if let Err(error) = self.output.reopen() {
            log::warn!("{error}");
        }
        bytes
    }

    async fn stop(mut self) -> Result<Vec<u8>, CompressError> {
        self.encoder
            .send_eof()
            .map_err(|error| encoder_error("send_eof failed", error))?;
        self.write_encoded_video()?;
        if let Some(AudioOutput::Transcode(transcoder)) = self.audio.as_mut() {
            let stream_time_base = self.output.time_base(AUDIO_STREAM);
            transcoder.finish(stream_time_base, &mut self.output)?;
        }
        self.output.write_trailer()?;
        Ok(self.output.take_bytes())
    }
}

/// A muxer context writing into an FFmpeg dynamic memory buffer.
///
/// Owns the context. `pb` is either null or an open dynamic buffer.
struct MemoryOutput {
    context: *mut AVFormatContext,
}

impl MemoryOutput {
    fn new(container: &str) -> Result<Self, CompressError> {
        let container_name = CString::new(container)
            .map_err(|error| CompressError::Encoder(format!("invalid container name: {error}")))?;

        let mut context: *mut AVFormatContext = std::ptr::null_mut();
        // SAFETY: `context` is an out-pointer; on failure it stays null.
        let result = unsafe {
            ffmpeg_sys_next::avformat_alloc_output_context2(
                &mut context,
                std::ptr::null_mut(),
                container_name.as_ptr(),
                std::ptr::null(),
            )
        };
        if result < 0 || context.is_null() {
            return Err(CompressError::Encoder(format!(
                "cannot allocate {container} muxer: {}",
                FfmpegError::from(result)
            )));
        }

        let mut output = Self { context };
        output.reopen()?;
        Ok(output)
    }

    fn needs_global_header(&self) -> bool {
        // SAFETY: the context and its output format are valid while `self`
        // lives.
        unsafe {
            ((*(*self.context).oformat).flags & ffmpeg_sys_next::AVFMT_GLOBALHEADER as i32) != 0
        }
    }

    /// Add a stream described by an opened encoder.
    fn add_encoded_stream(
        &mut self,
        encoder: &CodecContext,
        time_base: Rational,
        kind: &str,
    ) -> Result<(), CompressError> {
        // SAFETY: the context is valid, and the new stream belongs to it.
        unsafe {
            let stream = ffmpeg_sys_next::avformat_new_stream(self.context, std::ptr::null());
            if stream.is_null() {
                return Err(CompressError::Encoder(format!("cannot add {kind} stream")));
            }
            let result =
                ffmpeg_sys_next::avcodec_parameters_from_context((*stream).codecpar, encoder.as_ptr());
            if result < 0 {
                return Err(encoder_error(
                    &format!("cannot copy {kind} parameters"),
                    FfmpegError::from(result),
                ));
            }
            (*stream).time_base = AVRational {
                num: time_base.numerator(),
                den: time_base.denominator(),
            };
        }
        Ok(())
    }

    /// Add a stream that receives the source's packets unchanged.
    fn add_copied_stream(&mut self, track: &AudioTrackInfo) -> Result<(), CompressError> {
        let parameters = transcode::track_parameters(track)?;

        // SAFETY: the context is valid and the new stream belongs to it. The
        // parameters are deep-copied, extradata included.
        unsafe {
            let stream = ffmpeg_sys_next::avformat_new_stream(self.context, std::ptr::null());
            if stream.is_null() {
                return Err(CompressError::Encoder("cannot add audio stream".to_string()));
            }
            let result =
                ffmpeg_sys_next::avcodec_parameters_copy((*stream).codecpar, parameters.as_ptr());
            if result < 0 {
                return Err(encoder_error(
                    "cannot copy audio parameters",
                    FfmpegError::from(result),
                ));
            }
            (*stream).time_base = AVRational {
                num: track.time_base.0,
                den: track.time_base.1,
            };
        }
        Ok(())
    }

    fn write_header(&mut self) -> Result<(), CompressError> {
        // SAFETY: the context is valid and `pb` is an open dynamic buffer.
        let result =
            unsafe { ffmpeg_sys_next::avformat_write_header(self.context, std::ptr::null_mut()) };
        if result < 0 {
            return Err(encoder_error(
                "cannot write WebM header",
                FfmpegError::from(result),
            ));
        }
        Ok(())
    }

    /// Time base the muxer chose for stream `index`.
    fn time_base(&self, index: usize) -> Rational {
        // SAFETY: streams are only read within `nb_streams`.
        unsafe {
            if index >= (*self.context).nb_streams as usize {
                return Rational::new(1, 1000);
            }
            let stream = *(*self.context).streams.add(index);
            Rational::from((*stream).time_base)
        }
    }

    fn write(&mut self, packet: &mut Packet) -> Result<(), CompressError> {
        // SAFETY: the muxer never runs without an open buffer.
        unsafe {
            if (*self.context).pb.is_null() {
                return Err(CompressError::Encoder("output buffer is closed".to_string()));
            }
            let result =
                ffmpeg_sys_next::av_interleaved_write_frame(self.context, packet.as_mut_ptr());
            if result < 0 {
                return Err(encoder_error("cannot write packet", FfmpegError::from(result)));
            }
        }
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<(), CompressError> {
        // SAFETY: as in `write`.
        unsafe {
            if (*self.context).pb.is_null() {
                return Err(CompressError::Encoder("output buffer is closed".to_string()));
            }
            let result = ffmpeg_sys_next::av_write_trailer(self.context);
            if result < 0 {
                return Err(encoder_error(
                    "cannot write WebM trailer",
                    FfmpegError::from(result),
                ));
            }
        }
        Ok(())
    }

    /// Close the current buffer and return what it holds. Leaves `pb` null.
    fn take_bytes(&mut self) -> Vec<u8> {
        // SAFETY: `pb` is either null or a dynamic buffer opened by `reopen`;
        // the returned memory is copied and then freed with `av_free`.
        unsafe {
            let io = (*self.context).pb;
            if io.is_null() {
                return Vec::new();
            }
            let mut buffer: *mut u8 = std::ptr::null_mut();
            let size = ffmpeg_sys_next::avio_close_dyn_buf(io, &mut buffer);
            (*self.context).pb = std::ptr::null_mut();

            let bytes = if size > 0 && !buffer.is_null() {
                std::slice::from_raw_parts(buffer, size as usize).to_vec()
            } else {
                Vec::new()
            };
            if !buffer.is_null() {
                ffmpeg_sys_next::av_free(buffer as *mut _);
            }
            bytes
        }
    }

    fn reopen(&mut self) -> Result<(), CompressError> {
        // SAFETY: only called while `pb` is null, so no buffer leaks.
        let result = unsafe {
            if !(*self.context).pb.is_null() {
                return Ok(());
            }
            ffmpeg_sys_next::avio_open_dyn_buf(&mut (*self.context).pb)
        };
        if result < 0 {
            return Err(encoder_error(
                "cannot open output buffer",
                FfmpegError::from(result),
            ));
        }
        Ok(())
    }
}

impl PacketWriter for MemoryOutput {
    fn write_packet(&mut self, packet: &mut Packet) -> Result<(), CompressError> {
        self.write(packet)
    }
}

impl Drop for MemoryOutput {
    fn drop(&mut self) {
        self.take_bytes();
        // SAFETY: `pb` is null, so freeing the context releases only what it
        // owns.
        unsafe {
            ffmpeg_sys_next::avformat_free_context(self.context);
        }
    }
}

fn is_passthrough(track: &AudioTrackInfo) -> bool {
    PASSTHROUGH_AUDIO_CODECS.contains(&track.codec.as_str())
}

pub(crate) fn encoder_error(context: &str, error: FfmpegError) -> CompressError {
    CompressError::Encoder(format!("{context}: {error}"))
}
