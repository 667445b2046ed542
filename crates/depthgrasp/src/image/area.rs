//! Rotated, scaled crops around a pose.

use image::Rgba;
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

use super::sample::{bilinear_sample_replicate, nearest_sample_replicate};
use super::{plane_from_pixel, DepthImageBuffer, OrthographicImage, MAX_VALUE};
use crate::error::{GraspError, Result};
use crate::geometry::Pose;

/// Resampling filter used when warping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    /// Take the closest source pixel. Keeps invalid depth pixels from being
    /// blended into their neighbours.
    Nearest,
    /// Bilinear blend of the 4 surrounding source pixels.
    #[default]
    Bilinear,
}

/// A crop specification: `size_cropped` source pixels resampled to
/// `size_result` output pixels.
///
/// The crop is centered at the given pose and rotated by its yaw, so the
/// output's vertical axis is the pose's local x axis and its horizontal axis is
/// the pose's local y axis. Source pixels outside the image are replaced by the
/// nearest border pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AreaOfInterest {
    size_cropped: [f64; 2],
    size_result: Option<[u32; 2]>,
    interpolation: Interpolation,
}

impl AreaOfInterest {
    /// Create a crop of `size_cropped = [width, height]` source pixels,
    /// optionally resized to `size_result`.
    ///
    /// Both sizes must be positive and the resize must scale both axes equally.
    pub fn new(size_cropped: [f64; 2], size_result: Option<[u32; 2]>) -> Result<Self> {
        let [w, h] = size_cropped;
        if !(w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0) {
            return Err(GraspError::InvalidAreaSize {
                width: w,
                height: h,
            });
        }
        if let Some([rw, rh]) = size_result {
            if rw == 0 || rh == 0 {
                return Err(GraspError::InvalidAreaSize {
                    width: rw as f64,
                    height: rh as f64,
                });
            }
            let scale_x = rw as f64 / w;
            let scale_y = rh as f64 / h;
            if (scale_x - scale_y).abs() > 1e-9 * scale_x.max(scale_y) {
                return Err(GraspError::AnisotropicScale { scale_x, scale_y });
            }
        }
        Ok(Self {
            size_cropped,
            size_result,
            interpolation: Interpolation::default(),
        })
    }

    /// Square crop of `side` source pixels without resizing.
    pub fn square(side: f64) -> Result<Self> {
        Self::new([side, side], None)
    }

    /// Select the resampling filter.
    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    /// Source crop size `[width, height]` in pixels.
    pub fn size_cropped(&self) -> [f64; 2] {
        self.size_cropped
    }

    /// Output size `[width, height]` in pixels.
    pub fn result_size(&self) -> [u32; 2] {
        self.size_result.unwrap_or_else(|| {
            [
                self.size_cropped[0].round().max(1.0) as u32,
                self.size_cropped[1].round().max(1.0) as u32,
            ]
        })
    }

    /// Output pixels per source pixel.
    pub fn scale(&self) -> f64 {
        match self.size_result {
            Some([rw, _]) => rw as f64 / self.size_cropped[0],
            None => 1.0,
        }
    }

    /// Crop `image` around `pose` into a new image with scaled `pixel_size`.
    pub fn apply(&self, image: &OrthographicImage, pose: &Pose) -> OrthographicImage {
        let mat = self.apply_raw(image, pose);
        image.with_buffer(mat, self.scale() * image.pixel_size())
    }

    /// Crop `image` around `pose` and return only the pixel buffer.
    pub fn apply_raw(&self, image: &OrthographicImage, pose: &Pose) -> DepthImageBuffer {
        let [out_w, out_h] = self.result_size();
        let m = self.source_from_result(image, pose);
        let src = image.mat();
        let interpolation = self.interpolation;

        DepthImageBuffer::from_fn(out_w, out_h, |i, j| {
            let u = i as f64 + 0.5;
            let v = j as f64 + 0.5;
            let sx = m[(0, 0)] * u + m[(0, 1)] * v + m[(0, 2)] - 0.5;
            let sy = m[(1, 0)] * u + m[(1, 1)] * v + m[(1, 2)] - 0.5;
            let px = match interpolation {
                Interpolation::Bilinear => bilinear_sample_replicate(src, sx, sy),
                Interpolation::Nearest => nearest_sample_replicate(src, sx, sy),
            };
            Rgba(px.map(|c| c.round().clamp(0.0, MAX_VALUE as f32) as u16))
        })
    }

    /// Homogeneous map from output pixel coordinates to source pixel coordinates.
    pub(crate) fn source_from_result(&self, image: &OrthographicImage, pose: &Pose) -> Matrix3<f64> {
        let [out_w, out_h] = self.result_size();
        let (s, c) = pose.a.sin_cos();
        let world_from_local = Matrix3::new(c, -s, pose.x, s, c, pose.y, 0.0, 0.0, 1.0);
        let local_from_result = plane_from_pixel(
            out_w as f64,
            out_h as f64,
            self.scale() * image.pixel_size(),
        );
        image.pixel_from_plane() * world_from_local * local_from_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::DEPTH_CHANNEL;
    use crate::test_utils::{gradient_image, uniform_image};
    use approx::assert_abs_diff_eq;

    #[test]
    fn rejects_non_positive_sizes() {
        assert!(matches!(
            AreaOfInterest::new([0.0, 10.0], None),
            Err(GraspError::InvalidAreaSize { .. })
        ));
        assert!(matches!(
            AreaOfInterest::new([10.0, 10.0], Some([0, 4])),
            Err(GraspError::InvalidAreaSize { .. })
        ));
        assert!(matches!(
            AreaOfInterest::new([10.0, 20.0], Some([5, 5])),
            Err(GraspError::AnisotropicScale { .. })
        ));
    }

    #[test]
    fn output_pixel_size_follows_scale() {
        let img = uniform_image(64, 48, 1000.0, 30000);
        let area = AreaOfInterest::new([40.0, 40.0], Some([20, 20])).unwrap();
        let out = area.apply(&img, &Pose::identity());
        assert_eq!((out.width(), out.height()), (20, 20));
        assert_abs_diff_eq!(out.pixel_size(), 500.0, epsilon = 1e-12);
        assert_eq!(out.min_depth(), img.min_depth());
    }

    #[test]
    fn centered_identity_crop_copies_pixels() {
        let img = gradient_image(32, 32, 1000.0);
        let area = AreaOfInterest::square(16.0).unwrap();
        let out = area.apply_raw(&img, &Pose::identity());
        for j in 0..16 {
            for i in 0..16 {
                assert_eq!(out.get_pixel(i, j), img.mat().get_pixel(i + 8, j + 8));
            }
        }
    }

    #[test]
    fn crop_is_centered_on_translated_pose() {
        let img = gradient_image(64, 64, 1000.0);
        // x = 0.004 moves 4 rows up, y = -0.003 moves 3 columns right.
        let pose = Pose::planar(0.004, -0.003, 0.0);
        let out = AreaOfInterest::square(8.0).unwrap().apply_raw(&img, &pose);
        assert_eq!(out.get_pixel(4, 4), img.mat().get_pixel(32 + 3, 32 - 4));
    }

    #[test]
    fn borders_are_replicated_not_black() {
        let img = uniform_image(16, 16, 1000.0, 40000);
        let pose = Pose::planar(0.05, 0.05, 0.3);
        let out = AreaOfInterest::square(12.0).unwrap().apply_raw(&img, &pose);
        assert!(out.pixels().all(|p| p[DEPTH_CHANNEL] == 40000));
    }

    #[test]
    fn crop_then_inverse_crop_restores_original() {
        let img = gradient_image(64, 64, 1000.0);
        let pose = Pose::planar(0.005, -0.004, 0.3);
        let area = AreaOfInterest::square(64.0).unwrap();
        let cropped = area.apply(&img, &pose);
        let restored = area.apply_raw(&cropped, &pose.inverse());

        for j in 18..46 {
            for i in 18..46 {
                let a = img.mat().get_pixel(i, j)[DEPTH_CHANNEL] as i32;
                let b = restored.get_pixel(i, j)[DEPTH_CHANNEL] as i32;
                assert!((a - b).abs() <= 2, "pixel ({i}, {j}): {a} vs {b}");
            }
        }
    }
}
