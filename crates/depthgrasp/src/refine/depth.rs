//! Grasp depth from the central patch and the collision depth at the jaws.

use ndarray::ArrayView2;

use super::{DepthPatch, Refiner};
use crate::geometry::Pose;
use crate::image::OrthographicImage;

impl Refiner {
    /// Grasp depth (m) at `pose` for a gripper opened to `stroke`.
    ///
    /// The median depth of the central patch (retried with a larger patch),
    /// capped by the shallowest point under either jaw minus the collision
    /// margin, plus the configured offset. NaN if the central patch holds no
    /// valid pixel. A jaw patch without valid pixels imposes no cap.
    ///
    /// The cap is taken at the shallowest jaw point, not the deepest.
    pub fn estimate_z(&self, image: &OrthographicImage, pose: &Pose, stroke: f64) -> f64 {
        let cfg = &self.config;
        let ps = image.pixel_size();
        let side = cfg.area_size * ps;
        let Some(patch) = DepthPatch::crop(image, pose, side, side, cfg.invalid_threshold) else {
            return f64::NAN;
        };

        let center_px = cfg.center_patch * ps;
        let fallback_px = cfg.fallback_patch * ps;
        let center = nan_median(patch.window(center_px, center_px, 0.0, 0.0))
            .or_else(|| nan_median(patch.window(fallback_px, fallback_px, 0.0, 0.0)));
        let Some(center) = center else {
            tracing::debug!("no valid depth around ({:.4}, {:.4})", pose.x, pose.y);
            return f64::NAN;
        };
        let center_depth = patch.depth(center);

        let side_px = cfg.side_patch * ps;
        let jaw_offset = 0.5 * ps * (stroke + cfg.stroke_clearance);
        let collision = [-jaw_offset, jaw_offset]
            .iter()
            .filter_map(|&dc| nan_max(patch.window(side_px, side_px, 0.0, dc)))
            .map(|v| patch.depth(v))
            .fold(f64::INFINITY, f64::min)
            - cfg.collision_margin;

        center_depth.min(collision) + cfg.z_offset
    }
}

/// Median of the non-NaN entries.
pub(crate) fn nan_median(values: ArrayView2<'_, f32>) -> Option<f64> {
    let mut valid: Vec<f32> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if valid.is_empty() {
        return None;
    }
    valid.sort_unstable_by(f32::total_cmp);
    let n = valid.len();
    let median = if n % 2 == 1 {
        valid[n / 2] as f64
    } else {
        0.5 * (valid[n / 2 - 1] as f64 + valid[n / 2] as f64)
    };
    Some(median)
}

/// Largest non-NaN entry, i.e. the shallowest measured point.
fn nan_max(values: ArrayView2<'_, f32>) -> Option<f64> {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .reduce(f32::max)
        .map(f64::from)
}
