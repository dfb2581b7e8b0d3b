//! Internal helpers shared by the FFmpeg decoder and encoder.
//!
//! Pixel copying between FFmpeg frames and tightly packed RGB images, and
//! timestamp conversion.

use std::time::Duration;

use ffmpeg_next::Rational;
use ffmpeg_next::frame::Video as VideoFrame;
use image::RgbImage;

/// Copy an RGB24 FFmpeg frame into `image`, stripping per-row padding.
///
/// `image` is reallocated only when its dimensions differ from the frame's.
pub(crate) fn copy_frame_to_image(video_frame: &VideoFrame, image: &mut RgbImage) {
    let width = video_frame.width();
    let height = video_frame.height();
    if image.dimensions() != (width, height) {
        *image = RgbImage::new(width, height);
    }

    let stride = video_frame.stride(0);
    let row_length = (width as usize) * 3;
    let data = video_frame.data(0);
    let target: &mut [u8] = image;

    if stride == row_length {
        target.copy_from_slice(&data[..row_length * (height as usize)]);
    } else {
        for (row, target_row) in target.chunks_exact_mut(row_length).enumerate() {
            let row_start = row * stride;
            target_row.copy_from_slice(&data[row_start..row_start + row_length]);
        }
    }
}

/// Copy a packed RGB image into an RGB24 FFmpeg frame of the same size,
/// honouring the frame's stride.
pub(crate) fn copy_image_to_frame(image: &RgbImage, video_frame: &mut VideoFrame) {
    let row_length = (image.width() as usize) * 3;
    let stride = video_frame.stride(0);
    let data = video_frame.data_mut(0);

    for (row, source_row) in image.as_raw().chunks_exact(row_length).enumerate() {
        let row_start = row * stride;
        data[row_start..row_start + row_length].copy_from_slice(source_row);
    }
}

/// Convert a PTS in `time_base` to a duration. Negative values clamp to
/// zero.
pub(crate) fn pts_to_duration(pts: i64, time_base: Rational) -> Duration {
    let seconds = pts as f64 * f64::from(time_base.numerator())
        / f64::from(time_base.denominator());
    if seconds.is_finite() && seconds > 0.0 {
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}
