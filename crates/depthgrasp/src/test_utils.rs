//! Shared synthetic images and candidates for unit tests.

use image::Rgba;

use crate::geometry::Pose;
use crate::image::{DepthImageBuffer, OrthographicImage};
use crate::{Candidate, Timings};

/// Depth of a full-scale value in test images (m).
pub(crate) const TEST_MIN_DEPTH: f64 = 0.2;
/// Depth of a zero value in test images (m).
pub(crate) const TEST_MAX_DEPTH: f64 = 0.6;

fn wrap(mat: DepthImageBuffer, pixel_size: f64) -> OrthographicImage {
    OrthographicImage::new(mat, pixel_size, TEST_MIN_DEPTH, TEST_MAX_DEPTH)
        .expect("valid test image metadata")
}

/// All channels of every pixel set to `value`.
pub(crate) fn uniform_image(w: u32, h: u32, pixel_size: f64, value: u16) -> OrthographicImage {
    wrap(
        DepthImageBuffer::from_pixel(w, h, Rgba([value; 4])),
        pixel_size,
    )
}

/// Linear ramp `1000 + 300 * col + 200 * row` in all channels.
pub(crate) fn gradient_image(w: u32, h: u32, pixel_size: f64) -> OrthographicImage {
    wrap(
        DepthImageBuffer::from_fn(w, h, |x, y| Rgba([(1000 + 300 * x + 200 * y) as u16; 4])),
        pixel_size,
    )
}

/// Raw channel values from a function of the workspace position of each
/// pixel center. `None` leaves the pixel black (unmeasured).
pub(crate) fn depth_image_from_fn<F>(w: u32, h: u32, pixel_size: f64, f: F) -> OrthographicImage
where
    F: Fn(f64, f64) -> Option<u16>,
{
    let mut img = wrap(DepthImageBuffer::new(w, h), pixel_size);
    for row in 0..h {
        for col in 0..w {
            let [x, y] = img.unproject([col as f64 + 0.5, row as f64 + 0.5]);
            if let Some(v) = f(x, y) {
                img.mat_mut().put_pixel(col, row, Rgba([v; 4]));
            }
        }
    }
    img
}

/// Physical depth (m) from a function of the workspace position.
pub(crate) fn depth_map<F>(w: u32, h: u32, pixel_size: f64, f: F) -> OrthographicImage
where
    F: Fn(f64, f64) -> Option<f64>,
{
    let probe = wrap(DepthImageBuffer::new(1, 1), pixel_size);
    depth_image_from_fn(w, h, pixel_size, |x, y| {
        f(x, y).map(|d| probe.value_from_depth(d) as u16)
    })
}

/// A freshly generated planar candidate.
pub(crate) fn candidate_at(pose: Pose, stroke: f64) -> Candidate {
    Candidate {
        pose: Pose { z: f64::NAN, ..pose },
        stroke_index: 0,
        stroke,
        estimated_reward: 1.0,
        index: [0; 4],
        model_action: None,
        method: "Max".to_string(),
        timings: Timings::default(),
    }
}
