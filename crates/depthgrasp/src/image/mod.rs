//! Orthographic depth images.
//!
//! An [`OrthographicImage`] is a top-down RGBA-16 image whose last channel
//! encodes depth linearly between `max_depth` (value 0) and `min_depth`
//! (full-scale value). Pixel coordinates relate to the workspace plane through
//! `pixel_size` (pixels per meter) with the image center at the workspace
//! origin:
//!
//! - column = `width / 2 - pixel_size * y`
//! - row = `height / 2 - pixel_size * x`
//!
//! Continuous pixel coordinates place the center of pixel `i` at `i + 0.5`.

mod area;
mod sample;

pub use area::{AreaOfInterest, Interpolation};

use image::{DynamicImage, ImageBuffer, Rgba};
use nalgebra::Matrix3;

use crate::error::{GraspError, Result};

/// Pixel buffer type holding 3 color channels and 1 depth channel.
pub type DepthImageBuffer = ImageBuffer<Rgba<u16>, Vec<u16>>;

/// Channel index of the encoded depth.
pub const DEPTH_CHANNEL: usize = 3;

/// Full-scale channel value.
pub const MAX_VALUE: f64 = u16::MAX as f64;

/// A depth-augmented top-down image of the workspace.
#[derive(Debug, Clone)]
pub struct OrthographicImage {
    mat: DepthImageBuffer,
    pixel_size: f64,
    min_depth: f64,
    max_depth: f64,
}

impl OrthographicImage {
    /// Wrap an RGBA-16 buffer.
    ///
    /// `pixel_size` is in pixels per meter; `min_depth < max_depth` in meters.
    pub fn new(
        mat: DepthImageBuffer,
        pixel_size: f64,
        min_depth: f64,
        max_depth: f64,
    ) -> Result<Self> {
        if !(pixel_size.is_finite() && pixel_size > 0.0) {
            return Err(GraspError::InvalidPixelSize(pixel_size));
        }
        if !(min_depth.is_finite() && max_depth.is_finite() && min_depth < max_depth) {
            return Err(GraspError::InvalidDepthRange {
                min: min_depth,
                max: max_depth,
            });
        }
        Ok(Self {
            mat,
            pixel_size,
            min_depth,
            max_depth,
        })
    }

    /// Build from interleaved raw values with an explicit channel count.
    pub fn from_raw(
        width: u32,
        height: u32,
        channels: u8,
        data: Vec<u16>,
        pixel_size: f64,
        min_depth: f64,
        max_depth: f64,
    ) -> Result<Self> {
        if channels != 4 {
            return Err(GraspError::ChannelCount(channels));
        }
        let expected = width as usize * height as usize * 4;
        let got = data.len();
        let mat = DepthImageBuffer::from_raw(width, height, data)
            .ok_or(GraspError::BufferSize { expected, got })?;
        Self::new(mat, pixel_size, min_depth, max_depth)
    }

    /// Build from a decoded image. Only 4-channel images are accepted.
    pub fn from_dynamic(
        img: DynamicImage,
        pixel_size: f64,
        min_depth: f64,
        max_depth: f64,
    ) -> Result<Self> {
        let channels = img.color().channel_count();
        if channels != 4 {
            return Err(GraspError::ChannelCount(channels));
        }
        Self::new(img.into_rgba16(), pixel_size, min_depth, max_depth)
    }

    /// Underlying pixel buffer.
    pub fn mat(&self) -> &DepthImageBuffer {
        &self.mat
    }

    /// Mutable access to the pixel buffer.
    pub fn mat_mut(&mut self) -> &mut DepthImageBuffer {
        &mut self.mat
    }

    /// Image width in pixels.
    pub fn width(&self) -> u32 {
        self.mat.width()
    }

    /// Image height in pixels.
    pub fn height(&self) -> u32 {
        self.mat.height()
    }

    /// Pixels per meter.
    pub fn pixel_size(&self) -> f64 {
        self.pixel_size
    }

    /// Depth of a full-scale value (m).
    pub fn min_depth(&self) -> f64 {
        self.min_depth
    }

    /// Depth of a zero value (m).
    pub fn max_depth(&self) -> f64 {
        self.max_depth
    }

    /// `max_depth - min_depth` (m).
    pub fn depth_range(&self) -> f64 {
        self.max_depth - self.min_depth
    }

    /// Convert a raw depth-channel value to a physical depth.
    pub fn depth_from_value(&self, value: f64) -> f64 {
        self.max_depth + (value / MAX_VALUE) * (self.min_depth - self.max_depth)
    }

    /// Convert a physical depth to the nearest representable channel value.
    pub fn value_from_depth(&self, depth: f64) -> f64 {
        let value = ((depth - self.max_depth) / (self.min_depth - self.max_depth) * MAX_VALUE).round();
        value.clamp(0.0, MAX_VALUE)
    }

    /// Project a workspace-plane point to continuous pixel coordinates `[col, row]`.
    pub fn project(&self, point: [f64; 2]) -> [f64; 2] {
        [
            0.5 * self.width() as f64 - self.pixel_size * point[1],
            0.5 * self.height() as f64 - self.pixel_size * point[0],
        ]
    }

    /// Map continuous pixel coordinates `[col, row]` back to the workspace plane.
    pub fn unproject(&self, pixel: [f64; 2]) -> [f64; 2] {
        [
            (0.5 * self.height() as f64 - pixel[1]) / self.pixel_size,
            (0.5 * self.width() as f64 - pixel[0]) / self.pixel_size,
        ]
    }

    /// Homogeneous matrix mapping workspace-plane points to pixel coordinates.
    pub(crate) fn pixel_from_plane(&self) -> Matrix3<f64> {
        let ps = self.pixel_size;
        Matrix3::new(
            0.0,
            -ps,
            0.5 * self.width() as f64,
            -ps,
            0.0,
            0.5 * self.height() as f64,
            0.0,
            0.0,
            1.0,
        )
    }

    /// Homogeneous matrix mapping pixel coordinates to workspace-plane points.
    pub(crate) fn plane_from_pixel(&self) -> Matrix3<f64> {
        plane_from_pixel(self.width() as f64, self.height() as f64, self.pixel_size)
    }

    pub(crate) fn with_buffer(&self, mat: DepthImageBuffer, pixel_size: f64) -> Self {
        Self {
            mat,
            pixel_size,
            min_depth: self.min_depth,
            max_depth: self.max_depth,
        }
    }
}

pub(crate) fn plane_from_pixel(width: f64, height: f64, pixel_size: f64) -> Matrix3<f64> {
    let inv = 1.0 / pixel_size;
    Matrix3::new(
        0.0,
        -inv,
        0.5 * height * inv,
        -inv,
        0.0,
        0.5 * width * inv,
        0.0,
        0.0,
        1.0,
    )
}
