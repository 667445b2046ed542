//! Multi-view model input.
//!
//! One view per candidate yaw is cut from the image around the workspace
//! origin, rotated by that yaw and scaled to the model's resolution. A tensor
//! cell `(n, row, col)` of the model output maps back to a planar pose through
//! [`ViewLayout::pose_at`].

use image::{ImageBuffer, Luma, Rgba};
use ndarray::{s, Array4};
use serde::{Deserialize, Serialize};

use crate::error::{GraspError, Result};
use crate::geometry::{rotate_xy, Pose};
use crate::image::{AreaOfInterest, OrthographicImage, DEPTH_CHANNEL, MAX_VALUE};
use crate::model::{InputChannels, ModelSpec};
use crate::workspace::WorkspaceBoundary;

/// Configuration of the view batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Number of sampled yaw angles.
    pub orientations: usize,
    /// Distance of the outermost angles from `±π/2` (rad).
    pub angle_margin: f64,
    /// Paint everything outside the workspace boundary with its edge color.
    pub fill_outside_boundary: bool,
    /// Color samples per boundary edge (1 samples the corners only).
    pub edge_color_samples: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            orientations: 20,
            angle_margin: 0.05,
            fill_outside_boundary: true,
            edge_color_samples: 1,
        }
    }
}

/// Evenly spaced yaw angles in `[-π/2 + margin, π/2 - margin]`.
///
/// Fails if the set is empty or contains yaw 0, whose view is ambiguous with
/// its mirrored counterpart.
pub fn orientation_angles(count: usize, margin: f64) -> Result<Vec<f64>> {
    use std::f64::consts::FRAC_PI_2;

    if count == 0 {
        return Err(GraspError::InvalidOrientations(
            "at least one orientation is required".to_string(),
        ));
    }
    if !(margin.is_finite() && (0.0..FRAC_PI_2).contains(&margin)) {
        return Err(GraspError::InvalidOrientations(format!(
            "angle margin {margin} outside [0, pi/2)"
        )));
    }
    let lo = -FRAC_PI_2 + margin;
    let hi = FRAC_PI_2 - margin;
    let angles: Vec<f64> = if count == 1 {
        vec![lo]
    } else {
        let step = (hi - lo) / (count - 1) as f64;
        (0..count).map(|i| lo + step * i as f64).collect()
    };
    if angles.iter().any(|a| a.abs() < 1e-9) {
        return Err(GraspError::InvalidOrientations(format!(
            "{count} orientations include yaw 0; use an even count"
        )));
    }
    Ok(angles)
}

/// Geometry shared by all views of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewLayout {
    angles: Vec<f64>,
    scale: f64,
    stride: f64,
    pixel_size: f64,
    view_size: u32,
}

impl ViewLayout {
    pub(crate) fn new(angles: Vec<f64>, scale: f64, stride: f64, pixel_size: f64, view_size: u32) -> Self {
        Self {
            angles,
            scale,
            stride,
            pixel_size,
            view_size,
        }
    }

    /// Yaw of each view (rad).
    pub fn angles(&self) -> &[f64] {
        &self.angles
    }

    /// View pixels per source pixel.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// View pixels per output cell.
    pub fn stride(&self) -> f64 {
        self.stride
    }

    /// Pixel size of the source image (px/m).
    pub fn pixel_size(&self) -> f64 {
        self.pixel_size
    }

    /// Side length of each (square) view in pixels.
    pub fn view_size(&self) -> u32 {
        self.view_size
    }

    /// Planar pose of output cell `(orientation, row, col)` in an output grid
    /// of `rows x cols` cells.
    ///
    /// The grid is centered on the view. `z` is NaN (not measured yet).
    pub fn pose_at(&self, orientation: usize, row: usize, col: usize, rows: usize, cols: usize) -> Pose {
        let a = self.angles.get(orientation).copied().unwrap_or(f64::NAN);
        let view_pixel_size = self.scale * self.pixel_size;
        let dv = self.stride * (row as f64 + 0.5 - 0.5 * rows as f64);
        let du = self.stride * (col as f64 + 0.5 - 0.5 * cols as f64);
        let [x, y] = rotate_xy([-dv / view_pixel_size, -du / view_pixel_size], a);
        Pose::new(x, y, f64::NAN, a, 0.0, 0.0)
    }
}

/// Batch of views ready for the scoring model.
#[derive(Debug, Clone)]
pub struct ViewBatch {
    /// `[N, H, W, C]`, values in `[0, 1]`, depth in the last channel.
    pub tensor: Array4<f32>,
    /// Geometry of the views.
    pub layout: ViewLayout,
}

impl ViewBatch {
    /// Number of views.
    pub fn len(&self) -> usize {
        self.tensor.shape()[0]
    }

    /// Whether the batch holds no views.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Depth channel of view `n` as a 16-bit image, or `None` if out of range.
    pub fn depth_view(&self, n: usize) -> Option<ImageBuffer<Luma<u16>, Vec<u16>>> {
        if n >= self.len() {
            return None;
        }
        let shape = self.tensor.shape();
        let (h, w, c) = (shape[1], shape[2], shape[3]);
        let plane = self.tensor.slice(s![n, .., .., c - 1]);
        let mut out = ImageBuffer::new(w as u32, h as u32);
        for ((row, col), v) in plane.indexed_iter() {
            let value = (*v * MAX_VALUE as f32).round().clamp(0.0, MAX_VALUE as f32) as u16;
            out.put_pixel(col as u32, row as u32, Luma([value]));
        }
        Some(out)
    }
}

/// Builds the per-orientation view batch.
#[derive(Debug, Clone)]
pub struct MultiViewSampler {
    config: SamplerConfig,
    angles: Vec<f64>,
    scale: f64,
    stride: f64,
    channels: InputChannels,
}

impl MultiViewSampler {
    /// Create a sampler for `model`.
    pub fn new(config: SamplerConfig, model: &ModelSpec) -> Result<Self> {
        model.validate()?;
        let angles = orientation_angles(config.orientations, config.angle_margin)?;
        Ok(Self {
            config,
            angles,
            scale: model.scale(),
            stride: model.output_stride,
            channels: model.input_channels,
        })
    }

    /// Sampled yaw angles.
    pub fn angles(&self) -> &[f64] {
        &self.angles
    }

    /// Current configuration.
    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Side of each view so the farthest boundary corner (or image corner,
    /// without a boundary) stays inside every rotated view.
    pub fn view_size(&self, image: &OrthographicImage, boundary: Option<&WorkspaceBoundary>) -> u32 {
        let center = [0.5 * image.width() as f64, 0.5 * image.height() as f64];
        let corners = match boundary {
            Some(b) => b.project(image),
            None => vec![
                [0.0, 0.0],
                [image.width() as f64, 0.0],
                [0.0, image.height() as f64],
                [image.width() as f64, image.height() as f64],
            ],
        };
        let farthest = corners
            .iter()
            .map(|p| (p[0] - center[0]).hypot(p[1] - center[1]))
            .fold(0.0f64, f64::max);
        (2.0 * farthest * self.scale).ceil().max(1.0) as u32
    }

    /// Build the view batch for `image`. The caller's image is not modified.
    pub fn sample(&self, image: &OrthographicImage, boundary: Option<&WorkspaceBoundary>) -> Result<ViewBatch> {
        let side = self.view_size(image, boundary);
        let area = AreaOfInterest::new(
            [side as f64 / self.scale, side as f64 / self.scale],
            Some([side, side]),
        )?;

        let filled;
        let source = match boundary {
            Some(b) if self.config.fill_outside_boundary => {
                let mut copy = image.clone();
                fill_outside_boundary(&mut copy, b, self.config.edge_color_samples);
                filled = copy;
                &filled
            }
            _ => image,
        };

        let c = self.channels.count();
        let n = side as usize;
        let mut tensor = Array4::<f32>::zeros((self.angles.len(), n, n, c));
        let scale = 1.0 / MAX_VALUE as f32;
        for (k, &a) in self.angles.iter().enumerate() {
            let view = area.apply_raw(source, &Pose::planar(0.0, 0.0, a));
            let mut slot = tensor.slice_mut(s![k, .., .., ..]);
            for (col, row, px) in view.enumerate_pixels() {
                let (row, col) = (row as usize, col as usize);
                match self.channels {
                    InputChannels::Depth => {
                        slot[[row, col, 0]] = px[DEPTH_CHANNEL] as f32 * scale;
                    }
                    InputChannels::ColorDepth => {
                        for ch in 0..4 {
                            slot[[row, col, ch]] = px[ch] as f32 * scale;
                        }
                    }
                }
            }
        }

        tracing::debug!(
            "sampled {} views of {}x{} px (scale {:.4})",
            self.angles.len(),
            side,
            side,
            self.scale
        );

        Ok(ViewBatch {
            tensor,
            layout: ViewLayout::new(self.angles.clone(), self.scale, self.stride, image.pixel_size(), side),
        })
    }
}

/// Average color along the boundary outline, ignoring near-black samples.
fn boundary_edge_color(image: &OrthographicImage, boundary: &WorkspaceBoundary, samples_per_edge: usize) -> Rgba<u16> {
    let corners = boundary.project(image);
    let steps = samples_per_edge.max(1);
    let (w, h) = (image.width(), image.height());
    let dark = MAX_VALUE / 255.0;

    let mut sum = [0.0f64; 4];
    let mut count = 0usize;
    for (i, p) in corners.iter().enumerate() {
        let q = corners[(i + 1) % corners.len()];
        for k in 0..steps {
            let t = k as f64 / steps as f64;
            let x = (p[0] + t * (q[0] - p[0])).round().clamp(0.0, (w - 1) as f64) as u32;
            let y = (p[1] + t * (q[1] - p[1])).round().clamp(0.0, (h - 1) as f64) as u32;
            let px = image.mat().get_pixel(x, y).0;
            let mean = px.iter().map(|&v| v as f64).sum::<f64>() / 4.0;
            if mean < dark {
                continue;
            }
            for (acc, &v) in sum.iter_mut().zip(px.iter()) {
                *acc += v as f64;
            }
            count += 1;
        }
    }
    if count == 0 {
        return Rgba([0; 4]);
    }
    Rgba(sum.map(|v| (v / count as f64).round() as u16))
}

/// Overwrite every pixel outside `boundary` with the boundary's average edge color.
pub fn fill_outside_boundary(image: &mut OrthographicImage, boundary: &WorkspaceBoundary, samples_per_edge: usize) {
    if image.width() == 0 || image.height() == 0 {
        return;
    }
    let color = boundary_edge_color(image, boundary, samples_per_edge);
    let (w, h) = (image.width(), image.height());
    for row in 0..h {
        for col in 0..w {
            let p = image.unproject([col as f64 + 0.5, row as f64 + 0.5]);
            if !boundary.contains_xy(p) {
                image.mat_mut().put_pixel(col, row, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{depth_image_from_fn, uniform_image};
    use approx::assert_abs_diff_eq;

    fn spec() -> ModelSpec {
        ModelSpec {
            size_area_cropped: [40.0, 40.0],
            size_result: [20.0, 20.0],
            ..ModelSpec::default()
        }
    }

    #[test]
    fn default_angles_are_symmetric_and_skip_zero() {
        let angles = orientation_angles(20, 0.05).unwrap();
        assert_eq!(angles.len(), 20);
        assert_abs_diff_eq!(angles[0], -std::f64::consts::FRAC_PI_2 + 0.05, epsilon = 1e-12);
        assert_abs_diff_eq!(angles[0], -angles[19], epsilon = 1e-12);
        assert!(angles.iter().all(|a| a.abs() > 0.05));
    }

    #[test]
    fn angle_sets_containing_zero_are_rejected() {
        assert!(matches!(
            orientation_angles(21, 0.05),
            Err(GraspError::InvalidOrientations(_))
        ));
        assert!(matches!(
            orientation_angles(0, 0.05),
            Err(GraspError::InvalidOrientations(_))
        ));
    }

    #[test]
    fn view_size_contains_farthest_boundary_corner() {
        let img = uniform_image(200, 100, 1000.0, 30000);
        let sampler = MultiViewSampler::new(SamplerConfig::default(), &spec()).unwrap();
        // Corner at (0.03, 0.04) m is 50 px from the center; scale 0.5 gives 50 px.
        let bin = WorkspaceBoundary::from_center_size([0.0, 0.0, 0.0], [0.06, 0.08, 0.0]);
        assert_eq!(sampler.view_size(&img, Some(&bin)), 50);
        // Image corner is hypot(100, 50) px away.
        let expected = (2.0 * 100f64.hypot(50.0) * 0.5).ceil() as u32;
        assert_eq!(sampler.view_size(&img, None), expected);
    }

    #[test]
    fn batch_is_normalized_with_depth_last() {
        let img = uniform_image(64, 64, 1000.0, 65535);
        let mut model = spec();
        model.input_channels = InputChannels::ColorDepth;
        let sampler = MultiViewSampler::new(SamplerConfig::default(), &model).unwrap();
        let batch = sampler.sample(&img, None).unwrap();
        let shape = batch.tensor.shape().to_vec();
        assert_eq!(shape[0], 20);
        assert_eq!(shape[3], 4);
        assert!(batch.tensor.iter().all(|&v| (v - 1.0).abs() < 1e-6));
        assert_eq!(batch.depth_view(0).unwrap().get_pixel(3, 3)[0], 65535);
        assert!(batch.depth_view(20).is_none());
    }

    #[test]
    fn outside_of_boundary_gets_edge_color() {
        // Inside a 40 mm square the depth is 20000, outside it is 50000.
        let mut img = depth_image_from_fn(64, 64, 1000.0, |x, y| {
            if x.abs() <= 0.02 && y.abs() <= 0.02 {
                Some(20000)
            } else {
                Some(50000)
            }
        });
        let bin = WorkspaceBoundary::from_center_size([0.0, 0.0, 0.0], [0.04, 0.04, 0.0]);
        let color = boundary_edge_color(&img, &bin, 1);
        fill_outside_boundary(&mut img, &bin, 1);
        assert_eq!(img.mat().get_pixel(0, 0)[DEPTH_CHANNEL], color[DEPTH_CHANNEL]);
        assert_eq!(img.mat().get_pixel(32, 32)[DEPTH_CHANNEL], 20000);
    }

    #[test]
    fn dark_edge_samples_are_ignored() {
        let img = depth_image_from_fn(32, 32, 1000.0, |x, _| if x > 0.0 { None } else { Some(30000) });
        let bin = WorkspaceBoundary::from_center_size([0.0, 0.0, 0.0], [0.02, 0.02, 0.0]);
        let color = boundary_edge_color(&img, &bin, 4);
        assert_eq!(color[DEPTH_CHANNEL], 30000);
    }

    #[test]
    fn cell_pose_recovers_marked_point() {
        let model = spec();
        let sampler = MultiViewSampler::new(SamplerConfig::default(), &model).unwrap();
        let target = [0.012, -0.007];
        let img = depth_image_from_fn(80, 80, 1000.0, |x, y| {
            if (x - target[0]).hypot(y - target[1]) < 0.0025 {
                Some(60000)
            } else {
                Some(10000)
            }
        });
        let batch = sampler.sample(&img, None).unwrap();
        let (n, h, w) = (batch.len(), batch.tensor.shape()[1], batch.tensor.shape()[2]);
        let (rows, cols) = (h / 2, w / 2);
        let cell = 2.0 / (batch.layout.scale() * batch.layout.pixel_size());

        for k in 0..n {
            // Stride-2 average pooling stands in for the model.
            let mut best = (0.0f32, 0, 0);
            for r in 0..rows {
                for c in 0..cols {
                    let v = batch.tensor.slice(s![k, 2 * r..2 * r + 2, 2 * c..2 * c + 2, 0]).sum();
                    if v > best.0 {
                        best = (v, r, c);
                    }
                }
            }
            let pose = batch.layout.pose_at(k, best.1, best.2, rows, cols);
            assert_abs_diff_eq!(pose.a, batch.layout.angles()[k], epsilon = 1e-12);
            let err = (pose.x - target[0]).hypot(pose.y - target[1]);
            assert!(err < 1.5 * cell, "view {k}: error {err} > {}", 1.5 * cell);
        }
    }
}
