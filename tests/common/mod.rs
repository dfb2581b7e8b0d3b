//! Scripted in-memory collaborators.
//!
//! These drive the pipeline without FFmpeg: the store hands out fake
//! locations, the decoder replays a fixed list of presentations, and the
//! encoder writes one marker byte per sample so tests can count what reached
//! the output.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::RgbImage;
use vidsqueeze::{
    AudioSample, AudioTrackInfo, ByteReference, ByteStore, CompressError, CompressionPlan,
    EncoderFactory, MediaDecoder, MediaEncoder, Presentation, RawMetadata, SourceMedia,
    TrackLayout,
};

pub const HEADER: &[u8] = b"HDR";
pub const TRAILER: &[u8] = b"END";
pub const VIDEO_MARKER: u8 = b'V';
pub const AUDIO_MARKER: u8 = b'A';

/// Shared, ordered log of collaborator calls.
#[derive(Debug, Clone, Default)]
pub struct Events(Arc<Mutex<Vec<&'static str>>>);

impl Events {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: &'static str) {
        self.0.lock().unwrap().push(event);
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|&&e| e == event).count()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.count(event) > 0
    }

    pub fn all(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }
}

pub fn raw_metadata(duration_seconds: f64, width: u32, height: u32) -> RawMetadata {
    RawMetadata {
        duration_seconds,
        width,
        height,
    }
}

pub fn opus_track() -> AudioTrackInfo {
    AudioTrackInfo {
        codec: "opus".to_string(),
        sample_rate: 48_000,
        channels: 2,
        time_base: (1, 48_000),
        extradata: vec![0x4F, 0x70, 0x75, 0x73],
        block_align: 0,
        bits_per_coded_sample: 0,
    }
}

pub fn aac_track() -> AudioTrackInfo {
    AudioTrackInfo {
        codec: "aac".to_string(),
        sample_rate: 44_100,
        channels: 2,
        time_base: (1, 44_100),
        extradata: vec![0x12, 0x10],
        block_align: 0,
        bits_per_coded_sample: 0,
    }
}

/// A codec no encoder in these tests can decode.
pub fn unknown_track() -> AudioTrackInfo {
    AudioTrackInfo {
        codec: "tta".to_string(),
        ..aac_track()
    }
}

pub fn sample_source() -> SourceMedia {
    SourceMedia::new(vec![7u8; 4096], "holiday.mp4", "video/mp4")
}

// ── Byte store ─────────────────────────────────────────────────────

#[derive(Debug)]
pub struct MemoryReference {
    path: PathBuf,
}

impl ByteReference for MemoryReference {
    fn location(&self) -> &Path {
        &self.path
    }
}

pub struct MemoryStore {
    events: Events,
    fail: bool,
}

impl MemoryStore {
    pub fn new(events: &Events) -> Self {
        Self {
            events: events.clone(),
            fail: false,
        }
    }

    pub fn failing(events: &Events) -> Self {
        Self {
            events: events.clone(),
            fail: true,
        }
    }
}

impl ByteStore for MemoryStore {
    type Reference = MemoryReference;

    fn create(&mut self, source: &SourceMedia) -> Result<MemoryReference, CompressError> {
        if self.fail {
            return Err(CompressError::ResourceCreation(
                "no space left on device".to_string(),
            ));
        }
        self.events.record("create");
        Ok(MemoryReference {
            path: PathBuf::from("memory").join(source.name()),
        })
    }

    fn release(&mut self, _reference: MemoryReference) {
        self.events.record("release");
    }
}

// ── Decoder ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Frame(Duration),
    Pause,
    Fault(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadBehaviour {
    Ready,
    Fail(i32),
    Hang,
}

pub struct ScriptedDecoder {
    events: Events,
    metadata: RawMetadata,
    load: LoadBehaviour,
    audio: Option<AudioTrackInfo>,
    play_error: Option<String>,
    script: Vec<Step>,
    remaining: VecDeque<Step>,
    image: RgbImage,
    pending_audio: Vec<AudioSample>,
    audio_pts: i64,
}

impl ScriptedDecoder {
    /// A decoder reporting `metadata` and presenting nothing. Frames are a
    /// tenth of the reported size to keep resampling cheap.
    pub fn new(events: &Events, metadata: RawMetadata) -> Self {
        let width = (metadata.width / 10).max(1);
        let height = (metadata.height / 10).max(1);
        Self {
            events: events.clone(),
            metadata,
            load: LoadBehaviour::Ready,
            audio: None,
            play_error: None,
            script: Vec::new(),
            remaining: VecDeque::new(),
            image: RgbImage::from_pixel(width, height, image::Rgb([200, 40, 90])),
            pending_audio: Vec::new(),
            audio_pts: 0,
        }
    }

    /// Present `count` frames `interval` apart, starting at zero.
    pub fn with_frames_every(mut self, interval: Duration, count: u32) -> Self {
        self.script = (0..count).map(|index| Step::Frame(interval * index)).collect();
        self
    }

    pub fn with_script(mut self, script: Vec<Step>) -> Self {
        self.script = script;
        self
    }

    pub fn with_audio(mut self, track: AudioTrackInfo) -> Self {
        self.audio = Some(track);
        self
    }

    pub fn with_load(mut self, load: LoadBehaviour) -> Self {
        self.load = load;
        self
    }

    pub fn failing_play(mut self, message: &str) -> Self {
        self.play_error = Some(message.to_string());
        self
    }
}

impl MediaDecoder for ScriptedDecoder {
    async fn load(&mut self, _location: &Path) -> Result<RawMetadata, CompressError> {
        self.events.record("load");
        match self.load {
            LoadBehaviour::Ready => Ok(self.metadata),
            LoadBehaviour::Fail(code) => Err(CompressError::Load {
                code,
                message: "Invalid data found when processing input".to_string(),
            }),
            LoadBehaviour::Hang => std::future::pending().await,
        }
    }

    fn audio_track(&self) -> Option<AudioTrackInfo> {
        self.audio.clone()
    }

    fn rewind(&mut self) {
        self.events.record("rewind");
        self.remaining = self.script.iter().copied().collect();
        self.pending_audio.clear();
        self.audio_pts = 0;
    }

    async fn play(&mut self) -> Result<(), CompressError> {
        self.events.record("play");
        match &self.play_error {
            Some(message) => Err(CompressError::Playback(message.clone())),
            None => Ok(()),
        }
    }

    async fn next_presentation(&mut self) -> Result<Presentation<'_>, CompressError> {
        match self.remaining.pop_front() {
            Some(Step::Frame(position)) => {
                self.events.record("frame");
                if self.audio.is_some() {
                    self.pending_audio.push(AudioSample {
                        pts: self.audio_pts,
                        duration: 960,
                        data: vec![0xFC; 16],
                        keyframe: true,
                    });
                    self.audio_pts += 960;
                }
                Ok(Presentation::Frame {
                    image: &self.image,
                    position,
                })
            }
            Some(Step::Pause) => Ok(Presentation::Paused),
            Some(Step::Fault(code)) => Err(CompressError::Load {
                code,
                message: "corrupt packet".to_string(),
            }),
            None => Ok(Presentation::Ended),
        }
    }

    fn take_audio(&mut self) -> Vec<AudioSample> {
        std::mem::take(&mut self.pending_audio)
    }

    fn pause(&mut self) {
        self.events.record("pause");
    }

    fn detach(&mut self) {
        self.events.record("detach");
    }
}

// ── Encoder ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct EncoderLog {
    pub layout: Option<TrackLayout>,
    pub plan: Option<CompressionPlan>,
    pub video_indices: Vec<u64>,
    pub frame_dimensions: Vec<(u32, u32)>,
    pub audio_pts: Vec<i64>,
    pub stopped: bool,
}

pub struct RecordingEncoderFactory {
    events: Events,
    log: Arc<Mutex<EncoderLog>>,
    audio_codecs: Vec<&'static str>,
    fail_start: bool,
    fail_at_frame: Option<u64>,
}

impl RecordingEncoderFactory {
    pub fn new(events: &Events) -> Self {
        Self {
            events: events.clone(),
            log: Arc::new(Mutex::new(EncoderLog::default())),
            audio_codecs: vec!["opus", "vorbis", "aac", "mp3"],
            fail_start: false,
            fail_at_frame: None,
        }
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_at_frame(mut self, index: u64) -> Self {
        self.fail_at_frame = Some(index);
        self
    }

    pub fn log(&self) -> Arc<Mutex<EncoderLog>> {
        Arc::clone(&self.log)
    }
}

impl EncoderFactory for RecordingEncoderFactory {
    type Encoder = RecordingEncoder;

    fn accepts_audio(&self, track: &AudioTrackInfo) -> bool {
        self.audio_codecs.contains(&track.codec.as_str())
    }

    fn start(
        &mut self,
        layout: &TrackLayout,
        plan: &CompressionPlan,
    ) -> Result<RecordingEncoder, CompressError> {
        if self.fail_start {
            return Err(CompressError::Encoder("codec unavailable".to_string()));
        }
        self.events.record("start");
        {
            let mut log = self.log.lock().unwrap();
            log.layout = Some(layout.clone());
            log.plan = Some(*plan);
        }
        Ok(RecordingEncoder {
            events: self.events.clone(),
            log: Arc::clone(&self.log),
            pending: HEADER.to_vec(),
            fail_at_frame: self.fail_at_frame,
        })
    }
}

pub struct RecordingEncoder {
    events: Events,
    log: Arc<Mutex<EncoderLog>>,
    pending: Vec<u8>,
    fail_at_frame: Option<u64>,
}

impl RecordingEncoder {
    /// A started encoder outside any factory, with an empty header.
    pub fn standalone() -> (Self, Arc<Mutex<EncoderLog>>) {
        let log = Arc::new(Mutex::new(EncoderLog::default()));
        let encoder = Self {
            events: Events::new(),
            log: Arc::clone(&log),
            pending: Vec::new(),
            fail_at_frame: None,
        };
        (encoder, log)
    }
}

impl MediaEncoder for RecordingEncoder {
    fn push_video(&mut self, index: u64, frame: &RgbImage) -> Result<(), CompressError> {
        if self.fail_at_frame == Some(index) {
            return Err(CompressError::Encoder("scripted encoder fault".to_string()));
        }
        let mut log = self.log.lock().unwrap();
        log.video_indices.push(index);
        log.frame_dimensions.push(frame.dimensions());
        self.pending.push(VIDEO_MARKER);
        Ok(())
    }

    fn push_audio(&mut self, sample: &AudioSample) -> Result<(), CompressError> {
        self.log.lock().unwrap().audio_pts.push(sample.pts);
        self.pending.push(AUDIO_MARKER);
        Ok(())
    }

    fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }

    async fn stop(mut self) -> Result<Vec<u8>, CompressError> {
        self.events.record("stop");
        self.log.lock().unwrap().stopped = true;
        let mut trailing = std::mem::take(&mut self.pending);
        trailing.extend_from_slice(TRAILER);
        Ok(trailing)
    }
}
