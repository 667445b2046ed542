//! Rigid poses in the workspace frame and planar containment tests.

mod polygon;

pub use polygon::point_in_polygon;

use nalgebra::{Isometry3, Point3, Rotation3, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};

/// A 6-parameter rigid transform in the workspace frame.
///
/// `(x, y, z)` is the translation, `a` the yaw about z, `b` the tilt about y and
/// `c` the tilt about x. The rotation is `Rz(a) * Ry(b) * Rx(c)`.
///
/// `z` is the grasp depth below the camera plane. A candidate whose depth has
/// not been measured yet carries `z = NaN`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Translation along x (m).
    pub x: f64,
    /// Translation along y (m).
    pub y: f64,
    /// Translation along z (m).
    pub z: f64,
    /// Yaw about z (rad).
    pub a: f64,
    /// Tilt about y (rad).
    pub b: f64,
    /// Tilt about x (rad).
    pub c: f64,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    /// Construct from all six parameters.
    pub fn new(x: f64, y: f64, z: f64, a: f64, b: f64, c: f64) -> Self {
        Self { x, y, z, a, b, c }
    }

    /// The identity transform.
    pub fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0)
    }

    /// A pose in the workspace plane: position `(x, y)` and yaw `a`.
    pub fn planar(x: f64, y: f64, a: f64) -> Self {
        Self::new(x, y, 0.0, a, 0.0, 0.0)
    }

    /// Convert to an isometry.
    pub fn to_isometry(&self) -> Isometry3<f64> {
        let rotation = Rotation3::from_euler_angles(self.c, self.b, self.a);
        Isometry3::from_parts(
            Translation3::new(self.x, self.y, self.z),
            UnitQuaternion::from_rotation_matrix(&rotation),
        )
    }

    /// Convert from an isometry.
    pub fn from_isometry(iso: &Isometry3<f64>) -> Self {
        let t = iso.translation.vector;
        let (c, b, a) = iso.rotation.euler_angles();
        Self::new(t.x, t.y, t.z, a, b, c)
    }

    /// The inverse transform.
    pub fn inverse(&self) -> Self {
        Self::from_isometry(&self.to_isometry().inverse())
    }

    /// Compose `self * other` (apply `other` in the frame of `self`).
    pub fn compose(&self, other: &Pose) -> Self {
        Self::from_isometry(&(self.to_isometry() * other.to_isometry()))
    }

    /// Map a point given in this pose's frame into the parent frame.
    pub fn transform_point(&self, local: [f64; 3]) -> [f64; 3] {
        let p = self.to_isometry() * Point3::new(local[0], local[1], local[2]);
        [p.x, p.y, p.z]
    }

    /// Returns `true` when every component is finite.
    pub fn is_finite(&self) -> bool {
        [self.x, self.y, self.z, self.a, self.b, self.c]
            .iter()
            .all(|v| v.is_finite())
    }
}

impl std::ops::Mul for Pose {
    type Output = Pose;

    fn mul(self, rhs: Pose) -> Pose {
        self.compose(&rhs)
    }
}

impl std::fmt::Display for Pose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{:.4}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}]",
            self.x, self.y, self.z, self.a, self.b, self.c
        )
    }
}

/// Rotate a planar vector by `angle`.
#[inline]
pub(crate) fn rotate_xy(v: [f64; 2], angle: f64) -> [f64; 2] {
    let (s, c) = angle.sin_cos();
    [c * v[0] - s * v[1], s * v[0] + c * v[1]]
}
