//! Point-in-polygon test for the workspace plane.

const ON_EDGE_EPS: f64 = 1e-12;

/// Return `true` if `p` lies inside `polygon` or on its border.
///
/// The polygon is given as an ordered list of corners (either winding) and is
/// closed implicitly. Uses crossing-number parity, with an explicit on-edge test
/// so that border points count as inside.
pub fn point_in_polygon(p: [f64; 2], polygon: &[[f64; 2]]) -> bool {
    let n = polygon.len();
    if n < 3 || !p[0].is_finite() || !p[1].is_finite() {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let a = polygon[j];
        let b = polygon[i];
        if on_segment(p, a, b) {
            return true;
        }
        if (b[1] > p[1]) != (a[1] > p[1]) {
            let x_cross = b[0] + (p[1] - b[1]) * (a[0] - b[0]) / (a[1] - b[1]);
            if p[0] < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn on_segment(p: [f64; 2], a: [f64; 2], b: [f64; 2]) -> bool {
    let abx = b[0] - a[0];
    let aby = b[1] - a[1];
    let apx = p[0] - a[0];
    let apy = p[1] - a[1];
    let cross = abx * apy - aby * apx;
    let len2 = abx * abx + aby * aby;
    if cross.abs() > ON_EDGE_EPS * len2.max(1.0) {
        return false;
    }
    let dot = apx * abx + apy * aby;
    dot >= -ON_EDGE_EPS && dot <= len2 + ON_EDGE_EPS
}
