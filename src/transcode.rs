//! Audio re-encoding for tracks WebM cannot carry as they are.
//!
//! [`OpusTranscoder`] decodes source packets, resamples them to 48 kHz and
//! re-encodes them to Opus. Decoded audio arrives in whatever chunk sizes
//! the source codec uses, while the encoder wants fixed-size frames, so the
//! resampled samples wait in a [`SampleQueue`] until a whole frame is ready.

use std::ffi::CString;

use ffmpeg_next::codec::Parameters;
use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::codec::flag::Flags as CodecFlags;
use ffmpeg_next::codec::{Codec, Id};
use ffmpeg_next::decoder::Audio as AudioDecoder;
use ffmpeg_next::encoder::Audio as AudioEncoder;
use ffmpeg_next::format::Sample;
use ffmpeg_next::format::sample::Type as SampleType;
use ffmpeg_next::frame::Audio as AudioFrame;
use ffmpeg_next::software::resampling::Context as ResamplingContext;
use ffmpeg_next::{ChannelLayout, Dictionary, Packet, Rational, Rescale};
use ffmpeg_sys_next::AVMediaType;

use crate::error::CompressError;
use crate::mixer::{AudioSample, AudioTrackInfo};
use crate::webm::encoder_error;

const OPUS_SAMPLE_RATE: u32 = 48_000;
const OPUS_FRAME_SIZE: usize = 960;
const STEREO_BIT_RATE: usize = 96_000;
const MONO_BIT_RATE: usize = 48_000;
/// Room for samples the resampler carries over from earlier frames.
const RESAMPLE_HEADROOM: usize = 256;
const FLUSH_CAPACITY: usize = 4096;

/// Destination for encoded packets.
pub(crate) trait PacketWriter {
    /// Write a single packet whose stream index and timestamps are final.
    fn write_packet(&mut self, packet: &mut Packet) -> Result<(), CompressError>;
}

/// FFmpeg codec id for a codec name such as `"aac"` or `"mp3"`.
pub(crate) fn codec_id(name: &str) -> Option<Id> {
    let name = CString::new(name).ok()?;
    // SAFETY: descriptors are static tables owned by FFmpeg.
    unsafe {
        let descriptor = ffmpeg_sys_next::avcodec_descriptor_get_by_name(name.as_ptr());
        if descriptor.is_null() {
            return None;
        }
        Some(Id::from((*descriptor).id))
    }
}

/// libopus if present, FFmpeg's native encoder otherwise.
pub(crate) fn opus_encoder() -> Option<Codec> {
    ffmpeg_next::encoder::find_by_name("libopus").or_else(|| ffmpeg_next::encoder::find(Id::OPUS))
}

/// Whether `track` can be decoded here and re-encoded to Opus.
pub(crate) fn can_transcode(track: &AudioTrackInfo) -> bool {
    track.channels > 0
        && track.sample_rate > 0
        && codec_id(&track.codec)
            .and_then(ffmpeg_next::decoder::find)
            .is_some()
        && opus_encoder().is_some()
}

/// Codec parameters describing `track`, as a demuxer would report them.
pub(crate) fn track_parameters(track: &AudioTrackInfo) -> Result<Parameters, CompressError> {
    let id = codec_id(&track.codec)
        .ok_or_else(|| CompressError::Encoder(format!("unknown audio codec {}", track.codec)))?;

    let mut parameters = Parameters::new();
    // SAFETY: the parameters are freshly allocated and owned here. Extradata
    // is allocated with FFmpeg's allocator so the parameters free it.
    unsafe {
        let raw = parameters.as_mut_ptr();
        (*raw).codec_type = AVMediaType::AVMEDIA_TYPE_AUDIO;
        (*raw).codec_id = id.into();
        (*raw).sample_rate = i32::try_from(track.sample_rate).unwrap_or(i32::MAX);
        (*raw).block_align = i32::try_from(track.block_align).unwrap_or(0);
        (*raw).bits_per_coded_sample = i32::try_from(track.bits_per_coded_sample).unwrap_or(0);
        ffmpeg_sys_next::av_channel_layout_default(&mut (*raw).ch_layout, i32::from(track.channels));

        if !track.extradata.is_empty() {
            let padding = ffmpeg_sys_next::AV_INPUT_BUFFER_PADDING_SIZE as usize;
            let buffer = ffmpeg_sys_next::av_mallocz(track.extradata.len() + padding) as *mut u8;
            if buffer.is_null() {
                return Err(CompressError::Encoder(
                    "cannot allocate audio extradata".to_string(),
                ));
            }
            std::ptr::copy_nonoverlapping(track.extradata.as_ptr(), buffer, track.extradata.len());
            (*raw).extradata = buffer;
            (*raw).extradata_size = i32::try_from(track.extradata.len()).unwrap_or(i32::MAX);
        }
    }
    Ok(parameters)
}

/// Decodes one source audio track and re-encodes it to Opus.
pub(crate) struct OpusTranscoder {
    decoder: AudioDecoder,
    encoder: AudioEncoder,
    channels: u16,
    source_time_base: Rational,
    encoder_time_base: Rational,
    stream_index: usize,
    resampler: Option<ResamplingContext>,
    queue: SampleQueue,
    decoded: AudioFrame,
    packet: Packet,
    next_pts: Option<i64>,
}

impl OpusTranscoder {
    /// Open a decoder for `track` and an Opus encoder writing to stream
    /// `stream_index`. Mono sources stay mono, everything else becomes
    /// stereo.
    pub(crate) fn new(
        track: &AudioTrackInfo,
        global_header: bool,
        stream_index: usize,
    ) -> Result<Self, CompressError> {
        let decoder = CodecContext::from_parameters(track_parameters(track)?)
            .and_then(|context| context.decoder().audio())
            .map_err(|error| {
                encoder_error(&format!("cannot open {} decoder", track.codec), error)
            })?;

        let codec = opus_encoder()
            .ok_or_else(|| CompressError::Encoder("Opus encoder not available".to_string()))?;
        let channels = track.channels.clamp(1, 2);
        let layout = layout_for(channels);
        let format = codec
            .audio()
            .ok()
            .and_then(|audio| audio.formats())
            .and_then(|mut formats| formats.next())
            .unwrap_or(Sample::F32(SampleType::Packed));
        let encoder_time_base = Rational(1, OPUS_SAMPLE_RATE as i32);

        let mut context = CodecContext::new_with_codec(codec)
            .encoder()
            .audio()
            .map_err(|error| encoder_error("cannot create Opus context", error))?;
        context.set_rate(OPUS_SAMPLE_RATE as i32);
        context.set_channel_layout(layout);
        context.set_format(format);
        context.set_time_base(encoder_time_base);
        context.set_bit_rate(if channels == 2 {
            STEREO_BIT_RATE
        } else {
            MONO_BIT_RATE
        });
        if global_header {
            context.set_flags(CodecFlags::GLOBAL_HEADER);
        }

        let mut options = Dictionary::new();
        options.set("strict", "experimental");
        let encoder = context
            .open_as_with(codec, options)
            .map_err(|error| encoder_error("cannot open Opus encoder", error))?;
        let frame_size = match encoder.frame_size() {
            0 => OPUS_FRAME_SIZE,
            size => size as usize,
        };

        log::debug!(
            "Re-encoding {} audio ({} Hz, {} channels) to Opus, {frame_size} samples per frame",
            track.codec,
            track.sample_rate,
            track.channels
        );

        Ok(Self {
            decoder,
            encoder,
            channels,
            source_time_base: Rational(track.time_base.0, track.time_base.1),
            encoder_time_base,
            stream_index,
            resampler: None,
            queue: SampleQueue::new(format, layout, channels, frame_size),
            decoded: AudioFrame::empty(),
            packet: Packet::empty(),
            next_pts: None,
        })
    }

    /// The opened encoder, for describing the output stream.
    pub(crate) fn encoder(&self) -> &AudioEncoder {
        &self.encoder
    }

    /// Time base of the encoder's packets.
    pub(crate) fn time_base(&self) -> Rational {
        self.encoder_time_base
    }

    /// Decode one source packet and write every Opus packet it completes.
    ///
    /// Packets the decoder rejects are skipped.
    pub(crate) fn push<W: PacketWriter>(
        &mut self,
        sample: &AudioSample,
        stream_time_base: Rational,
        writer: &mut W,
    ) -> Result<(), CompressError> {
        if self.next_pts.is_none() {
            self.next_pts = Some(
                sample
                    .pts
                    .max(0)
                    .rescale(self.source_time_base, self.encoder_time_base),
            );
        }

        let mut packet = Packet::copy(&sample.data);
        packet.set_pts(Some(sample.pts));
        packet.set_dts(Some(sample.pts));
        packet.set_duration(sample.duration);
        if let Err(error) = self.decoder.send_packet(&packet) {
            log::debug!("Skipping undecodable audio packet at {}: {error}", sample.pts);
            return Ok(());
        }
        self.drain_decoder(stream_time_base, writer)
    }

    /// Drain the decoder and resampler, encode the remaining samples and
    /// flush the encoder.
    pub(crate) fn finish<W: PacketWriter>(
        &mut self,
        stream_time_base: Rational,
        writer: &mut W,
    ) -> Result<(), CompressError> {
        if self.decoder.send_eof().is_ok() {
            self.drain_decoder(stream_time_base, writer)?;
        }

        if let Some(resampler) = self.resampler.as_mut() {
            let mut tail = AudioFrame::new(
                self.encoder.format(),
                FLUSH_CAPACITY,
                self.encoder.channel_layout(),
            );
            tail.set_rate(OPUS_SAMPLE_RATE);
            if resampler.flush(&mut tail).is_ok() {
                self.queue.push(&tail);
            }
        }
        self.encode_queued(true, stream_time_base, writer)?;

        self.encoder
            .send_eof()
            .map_err(|error| encoder_error("Opus send_eof failed", error))?;
        self.write_encoded(stream_time_base, writer)
    }

    fn drain_decoder<W: PacketWriter>(
        &mut self,
        stream_time_base: Rational,
        writer: &mut W,
    ) -> Result<(), CompressError> {
        while self.decoder.receive_frame(&mut self.decoded).is_ok() {
            let resampled = self.resample()?;
            self.queue.push(&resampled);
            self.encode_queued(false, stream_time_base, writer)?;
        }
        Ok(())
    }

    /// Convert the decoded frame to the encoder's format, rate and layout.
    fn resample(&mut self) -> Result<AudioFrame, CompressError> {
        if self.resampler.is_none() {
            let source_layout = match self.decoder.channel_layout() {
                layout if layout.is_empty() => layout_for(self.channels),
                layout => layout,
            };
            let resampler = ResamplingContext::get(
                self.decoder.format(),
                source_layout,
                self.decoder.rate(),
                self.encoder.format(),
                self.encoder.channel_layout(),
                self.encoder.rate(),
            )
            .map_err(|error| encoder_error("cannot create audio resampler", error))?;
            self.resampler = Some(resampler);
        }

        let source_rate = self.decoder.rate().max(1) as usize;
        let capacity =
            self.decoded.samples() * OPUS_SAMPLE_RATE as usize / source_rate + RESAMPLE_HEADROOM;
        let mut resampled =
            AudioFrame::new(self.encoder.format(), capacity, self.encoder.channel_layout());
        resampled.set_rate(OPUS_SAMPLE_RATE);

        if let Some(resampler) = self.resampler.as_mut() {
            resampler
                .run(&self.decoded, &mut resampled)
                .map_err(|error| encoder_error("audio resampling failed", error))?;
        }
        Ok(resampled)
    }

    /// Encode whole frames from the queue. With `flush`, a short tail is
    /// padded with silence and encoded too.
    fn encode_queued<W: PacketWriter>(
        &mut self,
        flush: bool,
        stream_time_base: Rational,
        writer: &mut W,
    ) -> Result<(), CompressError> {
        while self.queue.len() >= self.queue.frame_size || (flush && self.queue.len() > 0) {
            let pts = self.next_pts.unwrap_or(0);
            let frame = self.queue.pop(pts);
            self.next_pts = Some(pts + self.queue.frame_size as i64);

            self.encoder
                .send_frame(&frame)
                .map_err(|error| encoder_error("Opus send_frame failed", error))?;
            self.write_encoded(stream_time_base, writer)?;
        }
        Ok(())
    }

    fn write_encoded<W: PacketWriter>(
        &mut self,
        stream_time_base: Rational,
        writer: &mut W,
    ) -> Result<(), CompressError> {
        while self.encoder.receive_packet(&mut self.packet).is_ok() {
            self.packet.set_stream(self.stream_index);
            self.packet.rescale_ts(self.encoder_time_base, stream_time_base);
            writer.write_packet(&mut self.packet)?;
        }
        Ok(())
    }
}

fn layout_for(channels: u16) -> ChannelLayout {
    if channels >= 2 {
        ChannelLayout::STEREO
    } else {
        ChannelLayout::MONO
    }
}

/// Encoder-format samples waiting to fill a whole encoder frame.
///
/// Holds one byte buffer per plane: one per channel for planar formats,
/// a single interleaved one otherwise.
struct SampleQueue {
    format: Sample,
    layout: ChannelLayout,
    frame_size: usize,
    /// Bytes one sample occupies in one plane.
    stride: usize,
    planes: Vec<Vec<u8>>,
}

impl SampleQueue {
    fn new(format: Sample, layout: ChannelLayout, channels: u16, frame_size: usize) -> Self {
        let channels = usize::from(channels);
        let (plane_count, stride) = if format.is_planar() {
            (channels, format.bytes())
        } else {
            (1, format.bytes() * channels)
        };
        Self {
            format,
            layout,
            frame_size,
            stride,
            planes: vec![Vec::new(); plane_count],
        }
    }

    /// Samples per channel currently queued.
    fn len(&self) -> usize {
        self.planes
            .first()
            .map_or(0, |plane| plane.len() / self.stride.max(1))
    }

    fn push(&mut self, frame: &AudioFrame) {
        let length = frame.samples() * self.stride;
        if length == 0 {
            return;
        }
        for (index, plane) in self.planes.iter_mut().enumerate() {
            if let Some(bytes) = frame.data(index).get(..length) {
                plane.extend_from_slice(bytes);
            }
        }
    }

    /// Take one frame of exactly `frame_size` samples stamped with `pts`.
    fn pop(&mut self, pts: i64) -> AudioFrame {
        let mut frame = AudioFrame::new(self.format, self.frame_size, self.layout);
        frame.set_rate(OPUS_SAMPLE_RATE);
        frame.set_pts(Some(pts));

        let wanted = self.frame_size * self.stride;
        for (index, plane) in self.planes.iter_mut().enumerate() {
            let available = plane.len().min(wanted);
            if let Some(target) = frame.data_mut(index).get_mut(..wanted) {
                target[..available].copy_from_slice(&plane[..available]);
                target[available..].fill(0);
            }
            plane.drain(..available);
        }
        frame
    }
}
