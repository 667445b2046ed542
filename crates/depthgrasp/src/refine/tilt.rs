//! Lateral tilt (b about the pose's y axis, c about its x axis) from depth
//! gradients next to the jaws.

use ndarray::{Array2, ArrayView2, Axis};

use super::{DepthPatch, Refiner, TiltConfig};
use crate::geometry::Pose;
use crate::image::OrthographicImage;

/// Weighted mean gradient of one side of the b strip.
#[derive(Debug, Clone, Copy)]
struct SideSlope {
    weighted_sum: f64,
    weight: f64,
}

impl SideSlope {
    fn mean(&self) -> Option<f64> {
        (self.weight > 0.0).then(|| self.weighted_sum / self.weight)
    }
}

impl Refiner {
    /// Tilt about the pose's y axis (rad), from the depth slope along the
    /// pose's x axis under both fingers. NaN if neither side has valid pixels.
    pub fn estimate_b(&self, image: &OrthographicImage, pose: &Pose, stroke: f64) -> f64 {
        let tilt = &self.config.tilt;
        let ps = image.pixel_size();
        let Some(patch) = DepthPatch::crop(
            image,
            pose,
            ps * (stroke + tilt.finger_thickness),
            ps * tilt.strip_length,
            self.config.invalid_threshold,
        ) else {
            return f64::NAN;
        };
        let values = patch.values();
        let (rows, cols) = values.dim();
        let band = ((2.0 * ps * tilt.finger_thickness) as usize).clamp(1, cols.max(1));
        if rows < 2 || cols == 0 {
            return f64::NAN;
        }

        let gradient = row_gradient(values);
        let weights = row_weights(rows, ps, tilt);
        let left = side_slope(&gradient, &weights, 0..band);
        let right = side_slope(&gradient, &weights, cols.saturating_sub(band)..cols);

        let to_angle = |g: f64| (patch.depth_range() * g).atan2(1.0 / patch.pixel_size());
        let both = SideSlope {
            weighted_sum: left.weighted_sum + right.weighted_sum,
            weight: left.weight + right.weight,
        };
        let Some(mean) = both.mean().map(to_angle) else {
            return f64::NAN;
        };

        let b = match (left.mean().map(to_angle), right.mean().map(to_angle)) {
            (Some(l), Some(r)) if (l > tilt.eps && r < -tilt.eps) || (l < -tilt.eps && r > tilt.eps) => {
                let dominant = if right.weight > left.weight || (right.weight == left.weight && r.abs() > l.abs()) {
                    r
                } else {
                    l
                };
                ((1.0 - tilt.certainty) * dominant + mean) / 2.0
            }
            _ => mean,
        };
        b.clamp(-tilt.max_lateral_angle, tilt.max_lateral_angle)
    }

    /// Tilt about the pose's x axis (rad), from the depth profile across the
    /// jaws. Needs the grasp depth in `pose.z`; NaN without it.
    pub fn estimate_c(&self, image: &OrthographicImage, pose: &Pose, stroke: f64) -> f64 {
        let tilt = &self.config.tilt;
        if !pose.z.is_finite() {
            return f64::NAN;
        }
        let ps = image.pixel_size();
        let Some(patch) = DepthPatch::crop(
            image,
            pose,
            ps * (stroke + tilt.finger_thickness),
            ps * tilt.finger_width / 2.0,
            self.config.invalid_threshold,
        ) else {
            return f64::NAN;
        };
        let (rows, cols) = patch.values().dim();
        if rows == 0 || cols < 2 {
            return f64::NAN;
        }

        // Unmeasured or deep pixels are pinned to a plane below the grasp.
        let floor = patch.normalized(pose.z + tilt.c_floor) as f32;
        let filled: Array2<f32> = patch
            .values()
            .mapv(|v| if v.is_nan() || v < floor { floor } else { v });

        let weights = row_weights(rows, ps, tilt);
        let weight_sum: f64 = weights.iter().sum();
        let profile: Vec<f64> = (0..cols - 1)
            .map(|c| {
                let col = filled.column(c);
                let next = filled.column(c + 1);
                col.iter()
                    .zip(next.iter())
                    .zip(weights.iter())
                    .map(|((&a, &b), &w)| w * (b - a) as f64)
                    .sum::<f64>()
                    / weight_sum
            })
            .collect();

        let norm = patch.depth_range();
        let inv_ps = 1.0 / patch.pixel_size();
        let max_g = profile.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min_g = profile.iter().copied().fold(f64::INFINITY, f64::min);
        let mean_g = profile.iter().sum::<f64>() / profile.len() as f64;

        let left = std::f64::consts::FRAC_PI_2 - (norm * max_g).atan2(inv_ps);
        let right = -std::f64::consts::FRAC_PI_2 - (norm * min_g).atan2(inv_ps);
        let mean = (norm * mean_g).atan2(inv_ps);

        let (eps, k) = (tilt.eps, tilt.certainty);
        let c = if left < eps && right > -eps {
            (left + right + 2.0 * mean) / 4.0
        } else if left >= eps && right <= -eps {
            mean
        } else if left <= eps {
            ((1.0 - k) * right + mean) / 2.0
        } else {
            ((1.0 - k) * -left + mean) / 2.0
        };
        c.clamp(-tilt.max_lateral_angle, tilt.max_lateral_angle)
    }
}

/// Gradient along rows: central differences inside, one-sided at the ends.
fn row_gradient(values: ArrayView2<'_, f32>) -> Array2<f32> {
    let (rows, cols) = values.dim();
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        if r == 0 {
            values[[1, c]] - values[[0, c]]
        } else if r == rows - 1 {
            values[[r, c]] - values[[r - 1, c]]
        } else {
            0.5 * (values[[r + 1, c]] - values[[r - 1, c]])
        }
    })
}

/// Gaussian weight of each row by its distance from the jaw line.
fn row_weights(rows: usize, pixel_size: f64, tilt: &TiltConfig) -> Vec<f64> {
    let sigma = tilt.sigma_factor * tilt.finger_width;
    (0..rows)
        .map(|r| {
            let d = (r as f64 + 0.5 - 0.5 * rows as f64) / pixel_size;
            (-0.5 * (d / sigma).powi(2)).exp()
        })
        .collect()
}

fn side_slope(gradient: &Array2<f32>, weights: &[f64], cols: std::ops::Range<usize>) -> SideSlope {
    let mut acc = SideSlope {
        weighted_sum: 0.0,
        weight: 0.0,
    };
    for (row, &w) in gradient.axis_iter(Axis(0)).zip(weights) {
        for &g in row.iter().skip(cols.start).take(cols.len()) {
            if g.is_finite() {
                acc.weighted_sum += w * g as f64;
                acc.weight += w;
            }
        }
    }
    acc
}
