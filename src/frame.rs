//! The target-resolution drawing surface.

use image::RgbImage;
use image::imageops::{self, FilterType};

/// An owned RGB surface at the plan's target resolution.
///
/// The capture loop draws every presented frame into it; the mixer reads it
/// between ticks to produce output video frames.
///
/// # Example
///
/// ```
/// use image::RgbImage;
/// use vidsqueeze::FrameBuffer;
///
/// let mut buffer = FrameBuffer::new(320, 180);
/// buffer.draw(&RgbImage::new(1280, 720));
/// assert_eq!(buffer.image().dimensions(), (320, 180));
/// assert_eq!(buffer.draws(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    surface: RgbImage,
    draws: u64,
}

impl FrameBuffer {
    /// Create a black surface of `width`×`height`.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            surface: RgbImage::new(width, height),
            draws: 0,
        }
    }

    /// Resample `frame` to fill the whole surface.
    ///
    /// Frames already at the target size are copied without filtering.
    pub fn draw(&mut self, frame: &RgbImage) {
        if frame.dimensions() == self.surface.dimensions() {
            self.surface.copy_from_slice(frame.as_raw());
        } else {
            let (width, height) = self.surface.dimensions();
            self.surface = imageops::resize(frame, width, height, FilterType::Triangle);
        }
        self.draws += 1;
    }

    /// The current surface content.
    pub fn image(&self) -> &RgbImage {
        &self.surface
    }

    /// Surface width in pixels.
    pub fn width(&self) -> u32 {
        self.surface.width()
    }

    /// Surface height in pixels.
    pub fn height(&self) -> u32 {
        self.surface.height()
    }

    /// Number of frames drawn so far.
    pub fn draws(&self) -> u64 {
        self.draws
    }
}
