//! Pixel sampling with replicated borders.

use super::DepthImageBuffer;

/// Sample all four channels at a sub-pixel position using bilinear interpolation.
///
/// `x`, `y` are in pixel-index space (pixel `i` is centered at `i`). Positions
/// outside the image are clamped to the nearest border pixel.
#[inline]
pub(crate) fn bilinear_sample_replicate(img: &DepthImageBuffer, x: f64, y: f64) -> [f32; 4] {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return [0.0; 4];
    }
    let xc = x.clamp(0.0, (w - 1) as f64);
    let yc = y.clamp(0.0, (h - 1) as f64);
    let x0 = xc.floor() as usize;
    let y0 = yc.floor() as usize;
    let x1 = (x0 + 1).min(w as usize - 1);
    let y1 = (y0 + 1).min(h as usize - 1);
    let fx = (xc - x0 as f64) as f32;
    let fy = (yc - y0 as f64) as f32;

    let stride = w as usize * 4;
    let raw = img.as_raw();
    let idx00 = y0 * stride + x0 * 4;
    let idx10 = y0 * stride + x1 * 4;
    let idx01 = y1 * stride + x0 * 4;
    let idx11 = y1 * stride + x1 * 4;

    let mut out = [0.0f32; 4];
    for (ch, o) in out.iter_mut().enumerate() {
        let p00 = raw[idx00 + ch] as f32;
        let p10 = raw[idx10 + ch] as f32;
        let p01 = raw[idx01 + ch] as f32;
        let p11 = raw[idx11 + ch] as f32;
        let top = p00 + fx * (p10 - p00);
        let bottom = p01 + fx * (p11 - p01);
        *o = top + fy * (bottom - top);
    }
    out
}

/// Sample all four channels at the nearest pixel, clamping to the border.
#[inline]
pub(crate) fn nearest_sample_replicate(img: &DepthImageBuffer, x: f64, y: f64) -> [f32; 4] {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return [0.0; 4];
    }
    let xi = x.round().clamp(0.0, (w - 1) as f64) as u32;
    let yi = y.round().clamp(0.0, (h - 1) as f64) as u32;
    let p = img.get_pixel(xi, yi).0;
    [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use image::Rgba;

    fn ramp() -> DepthImageBuffer {
        DepthImageBuffer::from_fn(4, 3, |x, y| {
            let v = (100 * x + 1000 * y) as u16;
            Rgba([v, v, v, v])
        })
    }

    #[test]
    fn bilinear_is_exact_on_linear_ramp() {
        let img = ramp();
        let s = bilinear_sample_replicate(&img, 1.25, 0.5);
        assert_abs_diff_eq!(s[3], 125.0 + 500.0, epsilon = 1e-3);
    }

    #[test]
    fn out_of_bounds_replicates_border() {
        let img = ramp();
        let s = bilinear_sample_replicate(&img, -5.0, 10.0);
        assert_abs_diff_eq!(s[0], 2000.0, epsilon = 1e-3);
        let n = nearest_sample_replicate(&img, 7.6, -1.0);
        assert_abs_diff_eq!(n[0], 300.0, epsilon = 1e-3);
    }
}
