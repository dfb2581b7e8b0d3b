//! FFmpeg-backed collaborator tests.
//!
//! Compression tests require fixture files from
//! `tests/fixtures/generate_fixtures.sh`.

use std::path::Path;
use std::time::Duration;

use vidsqueeze::{
    AudioTrackInfo, ByteReference, ByteStore, CompressError, CompressOptions, Compressor,
    EncoderFactory, FfmpegDecoder, MediaDecoder, MediaProbe, Pacing, SourceMedia, TempFileStore,
    WebmEncoderFactory,
};

const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

fn sample_video_path() -> &'static str {
    "tests/fixtures/sample_video.mp4"
}

fn sample_opus_path() -> &'static str {
    "tests/fixtures/sample_opus.webm"
}

fn unthrottled() -> CompressOptions {
    CompressOptions::new().with_pacing(Pacing::Unthrottled)
}

fn audio_track(codec: &str) -> AudioTrackInfo {
    AudioTrackInfo {
        codec: codec.to_string(),
        sample_rate: 44_100,
        channels: 2,
        time_base: (1, 44_100),
        extradata: Vec::new(),
        block_align: 0,
        bits_per_coded_sample: 0,
    }
}

/// Whether this FFmpeg build has an AAC decoder and an Opus encoder.
fn can_reencode_aac() -> bool {
    ffmpeg_next::decoder::find(ffmpeg_next::codec::Id::AAC).is_some()
        && (ffmpeg_next::encoder::find_by_name("libopus").is_some()
            || ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::OPUS).is_some())
}

// ── TempFileStore ──────────────────────────────────────────────────

#[test]
fn temp_file_holds_source_bytes() {
    let mut store = TempFileStore::new();
    let source = SourceMedia::new(b"not really a video".to_vec(), "clip.mkv", "video/x-matroska");

    let reference = store.create(&source).unwrap();
    let location = reference.location().to_path_buf();
    assert_eq!(std::fs::read(&location).unwrap(), b"not really a video");
    assert_eq!(location.extension().and_then(|e| e.to_str()), Some("mkv"));

    store.release(reference);
    assert!(!location.exists());
}

#[test]
fn temp_file_in_directory() {
    let directory = tempfile::tempdir().unwrap();
    let mut store = TempFileStore::in_directory(directory.path());
    assert_eq!(store.directory(), Some(directory.path()));

    let source = SourceMedia::new(vec![1, 2, 3], "clip", "video/mp4");
    let reference = store.create(&source).unwrap();
    assert!(reference.location().starts_with(directory.path()));
    assert_eq!(reference.location().extension(), None);
    store.release(reference);
}

#[test]
fn missing_directory_is_a_resource_error() {
    let directory = tempfile::tempdir().unwrap();
    let mut store = TempFileStore::in_directory(directory.path().join("missing"));
    let source = SourceMedia::new(vec![1, 2, 3], "clip.mp4", "video/mp4");

    match store.create(&source) {
        Err(CompressError::ResourceCreation(message)) => {
            assert!(message.contains("temporary file"), "{message}");
        }
        other => panic!("Expected ResourceCreation, got {other:?}"),
    }
}

// ── FfmpegDecoder ──────────────────────────────────────────────────

#[tokio::test]
async fn empty_source_fails_to_load() {
    let error = Compressor::ffmpeg(unthrottled())
        .run(SourceMedia::new(Vec::new(), "empty.mp4", "video/mp4"))
        .await
        .unwrap_err();
    assert!(matches!(error, CompressError::Load { .. }), "{error:?}");
}

#[tokio::test]
async fn play_before_load_is_rejected() {
    let mut decoder = FfmpegDecoder::new(Pacing::Unthrottled);
    let error = decoder.play().await.unwrap_err();
    assert!(matches!(error, CompressError::Playback(_)));
}

#[tokio::test]
async fn probe_reports_fixture_metadata() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut decoder = FfmpegDecoder::new(Pacing::Unthrottled);
    let metadata = MediaProbe::probe(&mut decoder, Path::new(path), Duration::from_secs(30))
        .await
        .unwrap();
    assert_eq!((metadata.width(), metadata.height()), (640, 480));
    assert!((metadata.duration_seconds() - 5.0).abs() < 0.1);
    decoder.detach();
}

#[cfg(unix)]
#[tokio::test]
async fn blocked_open_hits_load_timeout() {
    let directory = tempfile::tempdir().unwrap();
    let fifo = directory.path().join("stalled.mp4");
    let created = std::process::Command::new("mkfifo")
        .arg(&fifo)
        .status()
        .is_ok_and(|status| status.success());
    if !created {
        return;
    }

    let mut decoder = FfmpegDecoder::new(Pacing::Unthrottled);
    let started = std::time::Instant::now();
    let error = MediaProbe::probe(&mut decoder, &fifo, Duration::from_millis(500))
        .await
        .unwrap_err();
    assert!(
        matches!(error, CompressError::LoadTimeout(t) if t == Duration::from_millis(500)),
        "{error:?}"
    );
    assert!(started.elapsed() < Duration::from_secs(10));

    // Give the stalled open a writer, then close it so the open fails and
    // the blocking thread exits before the runtime shuts down.
    drop(std::fs::OpenOptions::new().write(true).open(&fifo).unwrap());
}

// ── WebmEncoderFactory ─────────────────────────────────────────────

#[test]
fn webm_copies_opus_and_vorbis() {
    let factory = WebmEncoderFactory::new();
    assert!(factory.accepts_audio(&audio_track("opus")));
    assert!(factory.accepts_audio(&audio_track("vorbis")));
}

#[test]
fn webm_accepts_decodable_audio_for_reencoding() {
    if !can_reencode_aac() {
        return;
    }
    assert!(WebmEncoderFactory::new().accepts_audio(&audio_track("aac")));
}

#[test]
fn webm_rejects_unknown_audio() {
    let factory = WebmEncoderFactory::new();
    assert!(!factory.accepts_audio(&audio_track("no-such-codec")));
    assert!(!factory.accepts_audio(&AudioTrackInfo {
        channels: 0,
        ..audio_track("aac")
    }));
}

// ── End to end ─────────────────────────────────────────────────────

#[tokio::test]
async fn compresses_fixture_to_webm() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let bytes = std::fs::read(path).unwrap();
    let source = SourceMedia::new(bytes, "sample_video.mp4", "video/mp4");
    let result = Compressor::ffmpeg(unthrottled()).run(source).await.unwrap();

    assert_eq!(result.file_name, "sample_video.webm");
    assert_eq!(result.mime_type, "video/webm");
    assert!(result.bytes.starts_with(&EBML_MAGIC));
    assert_eq!(result.compressed_size, result.bytes.len() as u64);
    assert_eq!(
        (result.plan.target_width, result.plan.target_height),
        (640, 480)
    );
}

#[tokio::test]
async fn aac_audio_is_reencoded_to_opus() {
    let path = sample_video_path();
    if !Path::new(path).exists() || !can_reencode_aac() {
        return;
    }

    let bytes = std::fs::read(path).unwrap();
    let source = SourceMedia::new(bytes, "sample_video.mp4", "video/mp4");
    let result = Compressor::ffmpeg(unthrottled()).run(source).await.unwrap();

    let directory = tempfile::tempdir().unwrap();
    let output = directory.path().join(&result.file_name);
    std::fs::write(&output, &result.bytes).unwrap();

    let mut decoder = FfmpegDecoder::new(Pacing::Unthrottled);
    MediaProbe::probe(&mut decoder, &output, Duration::from_secs(30))
        .await
        .unwrap();
    let track = decoder.audio_track().unwrap();
    assert_eq!(track.codec, "opus");
    assert_eq!(track.sample_rate, 48_000);
    decoder.detach();
}

#[tokio::test]
async fn compressed_output_is_decodable() {
    let path = sample_opus_path();
    if !Path::new(path).exists() {
        return;
    }

    let bytes = std::fs::read(path).unwrap();
    let source = SourceMedia::new(bytes, "sample_opus.webm", "video/webm");
    let result = Compressor::ffmpeg(unthrottled()).run(source).await.unwrap();

    let directory = tempfile::tempdir().unwrap();
    let output = directory.path().join(&result.file_name);
    std::fs::write(&output, &result.bytes).unwrap();

    let mut decoder = FfmpegDecoder::new(Pacing::Unthrottled);
    let metadata = MediaProbe::probe(&mut decoder, &output, Duration::from_secs(30))
        .await
        .unwrap();
    assert_eq!(metadata.width(), result.plan.target_width);
    assert!(decoder.audio_track().is_some_and(|track| track.codec == "opus"));
    decoder.detach();
}
