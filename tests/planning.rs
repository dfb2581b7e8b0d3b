//! Resolution and bitrate planning tests.

use vidsqueeze::{
    CompressionPlan, MediaMetadata, PlanLimits, RawMetadata, target_bitrate, target_dimensions,
};

fn metadata(duration_seconds: f64, width: u32, height: u32) -> MediaMetadata {
    MediaMetadata::try_from(RawMetadata {
        duration_seconds,
        width,
        height,
    })
    .expect("valid metadata")
}

// ── Bitrate ────────────────────────────────────────────────────────

#[test]
fn bitrate_spends_budget_over_duration() {
    let plan = CompressionPlan::calculate(&metadata(10.0, 1920, 1080), 2.0);
    assert_eq!(plan.target_bitrate, 1_677_721);
}

#[test]
fn long_videos_clamp_to_floor() {
    let plan = CompressionPlan::calculate(&metadata(60.0, 1920, 1080), 2.0);
    assert_eq!(plan.target_bitrate, 500_000);

    let plan = CompressionPlan::calculate(&metadata(3600.0, 1280, 720), 2.0);
    assert_eq!(plan.target_bitrate, 500_000);
}

#[test]
fn short_videos_clamp_to_ceiling() {
    let plan = CompressionPlan::calculate(&metadata(1.0, 1920, 1080), 2.0);
    assert_eq!(plan.target_bitrate, 2_500_000);
}

#[test]
fn bitrate_always_within_bounds() {
    let limits = PlanLimits::default();
    for duration in [0.001, 0.5, 3.0, 7.7, 33.3, 120.0, 86_400.0] {
        for budget in [0.1, 1.0, 2.0, 25.0] {
            let bitrate = target_bitrate(duration, budget, &limits);
            assert!(
                (500_000..=2_500_000).contains(&bitrate),
                "{duration}s at {budget} MB gave {bitrate}",
            );
        }
    }
}

#[test]
fn degenerate_budget_yields_floor() {
    let limits = PlanLimits::default();
    assert_eq!(target_bitrate(10.0, 0.0, &limits), 500_000);
    assert_eq!(target_bitrate(10.0, -3.0, &limits), 500_000);
    assert_eq!(target_bitrate(10.0, f64::NAN, &limits), 500_000);
}

#[test]
fn larger_budget_raises_bitrate() {
    let small = CompressionPlan::calculate(&metadata(20.0, 1280, 720), 2.0);
    let large = CompressionPlan::calculate(&metadata(20.0, 1280, 720), 4.0);
    assert!(large.target_bitrate > small.target_bitrate);
    assert_eq!(large.max_size_mb, 4.0);
}

// ── Resolution ─────────────────────────────────────────────────────

#[test]
fn landscape_caps_width() {
    assert_eq!(target_dimensions(1920, 1080, 720), (720, 406));
}

#[test]
fn portrait_caps_height() {
    assert_eq!(target_dimensions(1080, 1920, 720), (406, 720));
}

#[test]
fn square_caps_both_sides() {
    assert_eq!(target_dimensions(1000, 1000, 720), (720, 720));
}

#[test]
fn small_sources_keep_size() {
    assert_eq!(target_dimensions(640, 360, 720), (640, 360));
    assert_eq!(target_dimensions(720, 720, 720), (720, 720));
}

#[test]
fn odd_sizes_round_to_even() {
    assert_eq!(target_dimensions(641, 359, 720), (642, 360));
    assert_eq!(target_dimensions(1, 1, 720), (2, 2));
}

#[test]
fn downscaled_sides_keep_aspect_ratio() {
    let sources = [(1920, 1080), (1280, 1024), (3840, 1600), (721, 480), (500, 2000)];
    for (width, height) in sources {
        let (target_width, target_height) = target_dimensions(width, height, 720);
        assert_eq!(target_width.max(target_height), 720, "{width}x{height}");
        assert_eq!(target_width % 2, 0);
        assert_eq!(target_height % 2, 0);

        let exact = if width > height {
            f64::from(height) * 720.0 / f64::from(width)
        } else {
            f64::from(width) * 720.0 / f64::from(height)
        };
        let shorter = f64::from(target_width.min(target_height));
        assert!(
            (shorter - exact).abs() <= 1.5,
            "{width}x{height} -> {target_width}x{target_height}, exact {exact}",
        );
    }
}

#[test]
fn plan_records_source_and_frame_rate() {
    let plan = CompressionPlan::calculate(&metadata(5.0, 1920, 1080), 2.0);
    assert_eq!((plan.source_width, plan.source_height), (1920, 1080));
    assert_eq!((plan.target_width, plan.target_height), (720, 406));
    assert_eq!(plan.frame_rate, 25);
}

// ── Custom limits ──────────────────────────────────────────────────

#[test]
fn custom_limits_apply() {
    let limits = PlanLimits {
        max_dimension: 480,
        min_bitrate: 100_000,
        max_bitrate: 800_000,
        frame_rate: 30,
    };
    let plan = CompressionPlan::calculate_with(&metadata(60.0, 1920, 1080), 2.0, &limits);
    assert_eq!((plan.target_width, plan.target_height), (480, 270));
    assert_eq!(plan.target_bitrate, 279_620);
    assert_eq!(plan.frame_rate, 30);
}

#[test]
fn default_limits() {
    let limits = PlanLimits::default();
    assert_eq!(limits.max_dimension, 720);
    assert_eq!(limits.min_bitrate, 500_000);
    assert_eq!(limits.max_bitrate, 2_500_000);
    assert_eq!(limits.frame_rate, 25);
}
