//! Track selection and frame-slot sampling tests.

mod common;

use std::time::Duration;

use image::RgbImage;
use vidsqueeze::{
    AudioSample, AudioTrackInfo, CompressionPlan, FrameBuffer, MediaMetadata, RawMetadata,
    StreamEncoder, TrackMixer,
};

use common::{
    Events, RecordingEncoder, RecordingEncoderFactory, aac_track, opus_track, unknown_track,
};

fn plan() -> CompressionPlan {
    let metadata = MediaMetadata::try_from(RawMetadata {
        duration_seconds: 2.0,
        width: 1280,
        height: 720,
    })
    .unwrap();
    CompressionPlan::calculate(&metadata, 2.0)
}

fn factory() -> RecordingEncoderFactory {
    RecordingEncoderFactory::new(&Events::new())
}

fn stream() -> (
    StreamEncoder<RecordingEncoder>,
    std::sync::Arc<std::sync::Mutex<common::EncoderLog>>,
) {
    let (encoder, log) = RecordingEncoder::standalone();
    (StreamEncoder::new(encoder, Duration::MAX), log)
}

fn millis(value: u64) -> Duration {
    Duration::from_millis(value)
}

// ── Track layout ───────────────────────────────────────────────────

#[test]
fn layout_uses_plan_resolution() {
    let plan = plan();
    let mixer = TrackMixer::new(&plan, None, &factory());
    let video = mixer.layout().video;
    assert_eq!((video.width, video.height), (720, 406));
    assert_eq!(video.frame_rate, 25);
}

#[test]
fn no_audio_track_means_video_only() {
    let mixer = TrackMixer::new(&plan(), None, &factory());
    assert!(!mixer.has_audio());
}

#[test]
fn zero_channel_audio_is_dropped() {
    let silent = AudioTrackInfo {
        channels: 0,
        ..opus_track()
    };
    let mixer = TrackMixer::new(&plan(), Some(silent), &factory());
    assert!(!mixer.has_audio());
}

#[test]
fn unsupported_codec_is_dropped() {
    let mixer = TrackMixer::new(&plan(), Some(unknown_track()), &factory());
    assert!(!mixer.has_audio());
}

#[test]
fn reencodable_codec_is_kept() {
    let mixer = TrackMixer::new(&plan(), Some(aac_track()), &factory());
    assert!(mixer.has_audio());
    assert_eq!(mixer.layout().audio.as_ref().unwrap().codec, "aac");
}

#[test]
fn supported_codec_passes_through() {
    let mixer = TrackMixer::new(&plan(), Some(opus_track()), &factory());
    assert!(mixer.has_audio());
    assert_eq!(mixer.layout().audio.as_ref().unwrap().codec, "opus");
}

// ── Video sampling ─────────────────────────────────────────────────

#[test]
fn nothing_is_emitted_before_first_draw() {
    let plan = plan();
    let mut mixer = TrackMixer::new(&plan, None, &factory());
    let buffer = FrameBuffer::new(plan.target_width, plan.target_height);
    let (mut encoder, log) = stream();

    let emitted = mixer.advance_to(millis(500), &buffer, &mut encoder).unwrap();
    assert_eq!(emitted, 0);
    assert!(log.lock().unwrap().video_indices.is_empty());
}

#[test]
fn slots_before_each_presentation_are_filled() {
    let plan = plan();
    let mut mixer = TrackMixer::new(&plan, None, &factory());
    let mut buffer = FrameBuffer::new(plan.target_width, plan.target_height);
    let (mut encoder, log) = stream();
    let source = RgbImage::new(1280, 720);

    // First frame at 100 ms covers every slot before the second frame.
    assert_eq!(mixer.advance_to(millis(100), &buffer, &mut encoder).unwrap(), 0);
    buffer.draw(&source);

    // Slots 0..=4 start before 200 ms (k / 25 < 0.2).
    assert_eq!(mixer.advance_to(millis(200), &buffer, &mut encoder).unwrap(), 5);
    buffer.draw(&source);

    // 0.24 s is exactly slot 6, which has not started yet.
    assert_eq!(mixer.advance_to(millis(240), &buffer, &mut encoder).unwrap(), 1);
    assert_eq!(mixer.advance_to(millis(240), &buffer, &mut encoder).unwrap(), 0);

    let log = log.lock().unwrap();
    assert_eq!(log.video_indices, vec![0, 1, 2, 3, 4, 5]);
    assert!(log.frame_dimensions.iter().all(|&size| size == (720, 406)));
}

#[test]
fn finish_pads_to_duration() {
    let plan = plan();
    let mut mixer = TrackMixer::new(&plan, None, &factory());
    let mut buffer = FrameBuffer::new(plan.target_width, plan.target_height);
    let (mut encoder, log) = stream();

    buffer.draw(&RgbImage::new(1280, 720));
    mixer.advance_to(millis(400), &buffer, &mut encoder).unwrap();
    assert_eq!(mixer.video_frames(), 10);

    let padded = mixer.finish(Duration::from_secs(2), &buffer, &mut encoder).unwrap();
    assert_eq!(padded, 40);
    assert_eq!(mixer.video_frames(), 50);
    assert_eq!(log.lock().unwrap().video_indices.len(), 50);
}

#[test]
fn finish_emits_last_frame_even_past_duration() {
    let plan = plan();
    let mut mixer = TrackMixer::new(&plan, None, &factory());
    let mut buffer = FrameBuffer::new(plan.target_width, plan.target_height);
    let (mut encoder, _log) = stream();

    buffer.draw(&RgbImage::new(1280, 720));
    mixer.advance_to(Duration::from_secs(3), &buffer, &mut encoder).unwrap();
    let frames = mixer.video_frames();

    let padded = mixer.finish(Duration::from_secs(2), &buffer, &mut encoder).unwrap();
    assert_eq!(padded, 1);
    assert_eq!(mixer.video_frames(), frames + 1);
}

#[test]
fn positions_past_duration_stop_at_last_slot() {
    let plan = plan();
    let mut mixer = TrackMixer::new(&plan, None, &factory());
    let mut buffer = FrameBuffer::new(plan.target_width, plan.target_height);
    let (mut encoder, log) = stream();

    buffer.draw(&RgbImage::new(1280, 720));
    let emitted = mixer
        .advance_to(Duration::from_secs(3600), &buffer, &mut encoder)
        .unwrap();
    assert_eq!(emitted, 50);

    // A later jump back inside the duration adds nothing.
    assert_eq!(mixer.advance_to(millis(1500), &buffer, &mut encoder).unwrap(), 0);
    assert_eq!(mixer.advance_to(Duration::MAX, &buffer, &mut encoder).unwrap(), 0);

    let padded = mixer.finish(Duration::from_secs(2), &buffer, &mut encoder).unwrap();
    assert_eq!(padded, 1);
    assert_eq!(log.lock().unwrap().video_indices, (0..51).collect::<Vec<u64>>());
}

#[test]
fn finish_without_draws_emits_nothing() {
    let plan = plan();
    let mut mixer = TrackMixer::new(&plan, None, &factory());
    let buffer = FrameBuffer::new(plan.target_width, plan.target_height);
    let (mut encoder, _log) = stream();

    assert_eq!(mixer.finish(Duration::from_secs(2), &buffer, &mut encoder).unwrap(), 0);
}

// ── Audio pass-through ─────────────────────────────────────────────

fn samples(count: i64) -> Vec<AudioSample> {
    (0..count)
        .map(|index| AudioSample {
            pts: index * 960,
            duration: 960,
            data: vec![0xFC; 8],
            keyframe: true,
        })
        .collect()
}

#[test]
fn audio_reaches_encoder_when_carried() {
    let mut mixer = TrackMixer::new(&plan(), Some(opus_track()), &factory());
    let (mut encoder, log) = stream();

    mixer.pass_audio(samples(3), &mut encoder).unwrap();
    assert_eq!(mixer.audio_samples(), 3);
    assert_eq!(log.lock().unwrap().audio_pts, vec![0, 960, 1920]);
}

#[test]
fn audio_is_dropped_for_video_only_output() {
    let mut mixer = TrackMixer::new(&plan(), Some(unknown_track()), &factory());
    let (mut encoder, log) = stream();

    mixer.pass_audio(samples(3), &mut encoder).unwrap();
    assert_eq!(mixer.audio_samples(), 0);
    assert!(log.lock().unwrap().audio_pts.is_empty());
}
