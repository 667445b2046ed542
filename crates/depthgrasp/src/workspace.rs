//! Workspace boundary and gripper description.

use crate::error::{GraspError, Result};
use crate::geometry::{point_in_polygon, Pose};
use crate::image::OrthographicImage;

const PLANARITY_TOL: f64 = 1e-6;

/// Planar polygon bounding the usable workspace (e.g. the inside of a bin).
///
/// Corners are given in the workspace frame. All corners share one height;
/// containment is tested in the xy plane.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceBoundary {
    contour: Vec<[f64; 3]>,
    polygon: Vec<[f64; 2]>,
}

impl WorkspaceBoundary {
    /// Build from an ordered list of corners.
    pub fn from_contour(contour: Vec<[f64; 3]>) -> Result<Self> {
        if contour.len() < 3 {
            return Err(GraspError::TooFewCorners(contour.len()));
        }
        let (lo, hi) = contour
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
                (lo.min(c[2]), hi.max(c[2]))
            });
        let span = hi - lo;
        if !(span.is_finite() && span <= PLANARITY_TOL) {
            return Err(GraspError::NonPlanarBoundary(span));
        }
        let polygon = contour.iter().map(|c| [c[0], c[1]]).collect();
        Ok(Self { contour, polygon })
    }

    /// Axis-aligned rectangle of `size[0] x size[1]` around `center`, at height `size[2]`.
    pub fn from_center_size(center: [f64; 3], size: [f64; 3]) -> Self {
        let hx = 0.5 * size[0];
        let hy = 0.5 * size[1];
        let contour = vec![
            [center[0] + hx, center[1] + hy, size[2]],
            [center[0] + hx, center[1] - hy, size[2]],
            [center[0] - hx, center[1] - hy, size[2]],
            [center[0] - hx, center[1] + hy, size[2]],
        ];
        let polygon = contour.iter().map(|c| [c[0], c[1]]).collect();
        Self { contour, polygon }
    }

    /// Corners in the workspace frame.
    pub fn contour(&self) -> &[[f64; 3]] {
        &self.contour
    }

    /// Common height of all corners.
    pub fn height(&self) -> f64 {
        self.contour[0][2]
    }

    /// Corners in continuous pixel coordinates of `image`.
    pub fn project(&self, image: &OrthographicImage) -> Vec<[f64; 2]> {
        self.polygon.iter().map(|&p| image.project(p)).collect()
    }

    /// Whether the planar point `p` is inside the boundary (border included).
    pub fn contains_xy(&self, p: [f64; 2]) -> bool {
        point_in_polygon(p, &self.polygon)
    }

    /// Whether both jaw contact points of a grasp at `pose` with opening
    /// `stroke + clearance` lie inside the boundary.
    ///
    /// The jaws close along the pose's local y axis.
    pub fn contains_jaws(&self, pose: &Pose, stroke: f64, clearance: f64) -> bool {
        let half = 0.5 * (stroke + clearance);
        [half, -half].iter().all(|&dy| {
            let p = pose.transform_point([0.0, dy, 0.0]);
            self.contains_xy([p[0], p[1]])
        })
    }
}

/// Gripper capabilities relevant for grasp selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GripperSpec {
    min_stroke: f64,
    max_stroke: f64,
    finger_thickness: f64,
    tip_offset: Option<Pose>,
}

impl Default for GripperSpec {
    fn default() -> Self {
        Self {
            min_stroke: 0.0,
            max_stroke: f64::INFINITY,
            finger_thickness: 0.004,
            tip_offset: None,
        }
    }
}

impl GripperSpec {
    /// Gripper with an allowed stroke interval `[min_stroke, max_stroke]` (m).
    pub fn new(min_stroke: f64, max_stroke: f64) -> Self {
        Self {
            min_stroke,
            max_stroke,
            ..Self::default()
        }
    }

    /// Set the finger thickness (m).
    pub fn with_finger_thickness(mut self, thickness: f64) -> Self {
        self.finger_thickness = thickness;
        self
    }

    /// Set the transform from the nominal grasp frame to the gripper tip.
    pub fn with_tip_offset(mut self, offset: Pose) -> Self {
        self.tip_offset = Some(offset);
        self
    }

    /// Smallest allowed stroke (m).
    pub fn min_stroke(&self) -> f64 {
        self.min_stroke
    }

    /// Largest allowed stroke (m).
    pub fn max_stroke(&self) -> f64 {
        self.max_stroke
    }

    /// Finger thickness (m).
    pub fn finger_thickness(&self) -> f64 {
        self.finger_thickness
    }

    /// Tip offset, if any.
    pub fn tip_offset(&self) -> Option<Pose> {
        self.tip_offset
    }

    /// Check that the stroke interval is non-empty and the finger thickness is non-negative.
    pub fn validate(&self) -> Result<()> {
        if self.min_stroke.is_nan() || self.max_stroke.is_nan() || self.min_stroke > self.max_stroke {
            return Err(GraspError::InvalidGripper(format!(
                "stroke interval [{}, {}] is empty",
                self.min_stroke, self.max_stroke
            )));
        }
        if !(self.finger_thickness.is_finite() && self.finger_thickness >= 0.0) {
            return Err(GraspError::InvalidGripper(format!(
                "finger thickness {} must be finite and >= 0",
                self.finger_thickness
            )));
        }
        Ok(())
    }

    /// Whether the gripper can open to `stroke`.
    pub fn accepts_stroke(&self, stroke: f64) -> bool {
        self.min_stroke <= stroke && stroke <= self.max_stroke
    }

    /// Feasibility of each stroke in a stroke table.
    pub fn stroke_mask(&self, strokes: &[f64]) -> Vec<bool> {
        strokes.iter().map(|&s| self.accepts_stroke(s)).collect()
    }

    /// Map a grasp pose to the tip frame.
    pub fn apply_tip_offset(&self, pose: Pose) -> Pose {
        match self.tip_offset {
            Some(offset) => pose * offset,
            None => pose,
        }
    }
}
