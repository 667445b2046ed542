//! Model-free refinement of grasp depth and lateral tilt.
//!
//! All estimates are taken from the depth channel in small crops aligned with
//! the candidate (rows along the pose's x axis, columns along the closing
//! axis). Pixels whose normalized depth value is below
//! [`RefineConfig::invalid_threshold`] carry no measurement and are excluded
//! from every statistic. An estimate that cannot be made is NaN, which makes
//! the safety checker reject the candidate.

mod depth;
mod tilt;

use ndarray::{s, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::geometry::Pose;
use crate::image::{AreaOfInterest, Interpolation, OrthographicImage, DEPTH_CHANNEL, MAX_VALUE};
use crate::Candidate;

/// Parameters of the lateral tilt estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TiltConfig {
    /// Largest tilt reported, in either direction (rad).
    pub max_lateral_angle: f64,
    /// Length of the b strips along the pose's x axis (m).
    pub strip_length: f64,
    /// Finger width along the pose's x axis (m).
    pub finger_width: f64,
    /// Finger thickness along the closing axis (m).
    pub finger_thickness: f64,
    /// Gaussian row weights use `sigma = sigma_factor * finger_width`.
    pub sigma_factor: f64,
    /// Angles within `±eps` count as having no sign (rad).
    pub eps: f64,
    /// Weight in `[0, 1]` moved away from the dominant side when both sides disagree.
    pub certainty: f64,
    /// Depth below the grasp where the c profile is floored (m).
    pub c_floor: f64,
}

impl Default for TiltConfig {
    fn default() -> Self {
        Self {
            max_lateral_angle: 0.5,
            strip_length: 0.12,
            finger_width: 0.016,
            finger_thickness: 0.004,
            sigma_factor: 1.3,
            eps: 0.03,
            certainty: 0.0,
            c_floor: 0.04,
        }
    }
}

/// Parameters of the depth refinement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineConfig {
    /// Side of the square crop around the candidate (m).
    pub area_size: f64,
    /// Added to the estimated depth (m).
    pub z_offset: f64,
    /// Normalized depth values below this carry no measurement.
    pub invalid_threshold: f32,
    /// Side of the central patch for the grasp depth (m).
    pub center_patch: f64,
    /// Side of the retry patch when the central one has no valid pixel (m).
    pub fallback_patch: f64,
    /// Side of each jaw patch for the collision depth (m).
    pub side_patch: f64,
    /// Added to the stroke when placing the jaw patches (m).
    pub stroke_clearance: f64,
    /// Distance kept above the shallowest point at the jaws (m).
    pub collision_margin: f64,
    /// Estimate b and c for candidates without a model action.
    pub lateral: bool,
    /// Tilt estimation parameters.
    pub tilt: TiltConfig,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            area_size: 0.1,
            z_offset: 0.0,
            invalid_threshold: 0.02,
            center_patch: 0.012,
            fallback_patch: 0.03,
            side_patch: 0.025,
            stroke_clearance: 0.002,
            collision_margin: 0.03,
            lateral: false,
            tilt: TiltConfig::default(),
        }
    }
}

/// Normalized depth values of a crop, NaN where unmeasured.
#[derive(Debug, Clone)]
pub(crate) struct DepthPatch {
    values: Array2<f32>,
    pixel_size: f64,
    min_depth: f64,
    max_depth: f64,
}

impl DepthPatch {
    /// Crop `width_px x height_px` pixels around `pose` (yaw only).
    ///
    /// Returns `None` for an empty crop.
    pub(crate) fn crop(
        image: &OrthographicImage,
        pose: &Pose,
        width_px: f64,
        height_px: f64,
        invalid_threshold: f32,
    ) -> Option<Self> {
        let area = AreaOfInterest::new([width_px, height_px], None)
            .ok()?
            .with_interpolation(Interpolation::Nearest);
        let mat = area.apply_raw(image, &Pose::planar(pose.x, pose.y, pose.a));
        let (w, h) = mat.dimensions();
        let values = Array2::from_shape_fn((h as usize, w as usize), |(r, c)| {
            let v = mat.get_pixel(c as u32, r as u32)[DEPTH_CHANNEL] as f32 / MAX_VALUE as f32;
            if v < invalid_threshold {
                f32::NAN
            } else {
                v
            }
        });
        Some(Self {
            values,
            pixel_size: image.pixel_size(),
            min_depth: image.min_depth(),
            max_depth: image.max_depth(),
        })
    }

    pub(crate) fn values(&self) -> ArrayView2<'_, f32> {
        self.values.view()
    }

    pub(crate) fn pixel_size(&self) -> f64 {
        self.pixel_size
    }

    pub(crate) fn depth_range(&self) -> f64 {
        self.max_depth - self.min_depth
    }

    /// Physical depth of a normalized value.
    pub(crate) fn depth(&self, normalized: f64) -> f64 {
        self.max_depth + normalized * (self.min_depth - self.max_depth)
    }

    /// Normalized value of a physical depth, clamped to `[0, 1]`.
    pub(crate) fn normalized(&self, depth: f64) -> f64 {
        ((depth - self.max_depth) / (self.min_depth - self.max_depth)).clamp(0.0, 1.0)
    }

    /// Centered `rows x cols` window shifted by `(row_offset, col_offset)` pixels,
    /// clipped to the patch.
    pub(crate) fn window(&self, rows: f64, cols: f64, row_offset: f64, col_offset: f64) -> ArrayView2<'_, f32> {
        let (h, w) = self.values.dim();
        let (r0, r1) = span(h, rows, row_offset);
        let (c0, c1) = span(w, cols, col_offset);
        self.values.slice(s![r0..r1, c0..c1])
    }
}

fn span(len: usize, size: f64, offset: f64) -> (usize, usize) {
    let lo = ((len as f64 - size) / 2.0 + offset).round();
    let hi = lo + size.round();
    let clip = |v: f64| v.clamp(0.0, len as f64) as usize;
    (clip(lo), clip(hi))
}

/// Fills in grasp depth and, optionally, lateral tilt from the depth channel.
#[derive(Debug, Clone, Default)]
pub struct Refiner {
    config: RefineConfig,
}

impl Refiner {
    /// Create a refiner.
    pub fn new(config: RefineConfig) -> Self {
        Self { config }
    }

    /// Current configuration.
    pub fn config(&self) -> &RefineConfig {
        &self.config
    }

    /// Mutable access to the configuration.
    pub fn config_mut(&mut self) -> &mut RefineConfig {
        &mut self.config
    }

    /// Refine `candidate` against `image`.
    ///
    /// Without a model action the depth is measured and, with
    /// [`RefineConfig::lateral`], b and c are estimated. With a model action
    /// the predicted depth is kept unless the measured one is shallower; the
    /// predicted tilt is kept.
    pub fn refine(&self, image: &OrthographicImage, mut candidate: Candidate) -> Candidate {
        let measured = self.estimate_z(image, &candidate.pose, candidate.stroke);

        match candidate.model_action {
            Some([z, _, _]) => {
                let predicted = z as f64;
                candidate.pose.z = if measured.is_finite() {
                    predicted.min(measured)
                } else {
                    predicted
                };
            }
            None => {
                candidate.pose.z = measured;
                if self.config.lateral {
                    candidate.pose.b = self.estimate_b(image, &candidate.pose, candidate.stroke);
                    candidate.pose.c = self.estimate_c(image, &candidate.pose, candidate.stroke);
                }
            }
        }
        candidate
    }
}
