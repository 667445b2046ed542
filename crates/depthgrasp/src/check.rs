//! Candidate validation.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::image::OrthographicImage;
use crate::refine::Refiner;
use crate::workspace::{GripperSpec, WorkspaceBoundary};
use crate::Candidate;

/// Safety-check configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// Added to the stroke before testing the jaw points against the boundary (m).
    pub jaw_clearance: f64,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            jaw_clearance: 0.002,
        }
    }
}

/// Extra collision test run on candidates that passed every other check,
/// e.g. by rendering the gripper into the depth image.
pub trait CollisionCheck {
    /// Return `true` if executing `candidate` would collide.
    fn collides(&self, image: &OrthographicImage, candidate: &Candidate) -> bool;
}

/// Why a candidate was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Depth or tilt could not be measured.
    NonFinitePose,
    /// A jaw contact point lies outside the workspace boundary.
    OutsideBoundary,
    /// The collision check reported a collision.
    Collision,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonFinitePose => write!(f, "pose is not finite"),
            Self::OutsideBoundary => write!(f, "jaws outside workspace boundary"),
            Self::Collision => write!(f, "collision"),
        }
    }
}

/// Refines candidates and accepts the first safe one.
pub struct SafetyChecker {
    refiner: Refiner,
    config: CheckConfig,
    collision: Option<Box<dyn CollisionCheck + Send + Sync>>,
}

impl fmt::Debug for SafetyChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafetyChecker")
            .field("refiner", &self.refiner)
            .field("config", &self.config)
            .field("collision_check", &self.collision.is_some())
            .finish()
    }
}

impl SafetyChecker {
    /// Create a checker without collision check.
    pub fn new(refiner: Refiner, config: CheckConfig) -> Self {
        Self {
            refiner,
            config,
            collision: None,
        }
    }

    /// Attach a collision check.
    pub fn with_collision_check(mut self, check: Box<dyn CollisionCheck + Send + Sync>) -> Self {
        self.collision = Some(check);
        self
    }

    /// The refiner applied to each candidate.
    pub fn refiner(&self) -> &Refiner {
        &self.refiner
    }

    /// Current configuration.
    pub fn config(&self) -> &CheckConfig {
        &self.config
    }

    /// Test an already refined candidate.
    pub fn evaluate(
        &self,
        image: &OrthographicImage,
        candidate: &Candidate,
        boundary: Option<&WorkspaceBoundary>,
    ) -> Result<(), Rejection> {
        if !candidate.pose.is_finite() {
            return Err(Rejection::NonFinitePose);
        }
        if let Some(boundary) = boundary {
            if !boundary.contains_jaws(&candidate.pose, candidate.stroke, self.config.jaw_clearance) {
                return Err(Rejection::OutsideBoundary);
            }
        }
        if let Some(check) = &self.collision {
            if check.collides(image, candidate) {
                return Err(Rejection::Collision);
            }
        }
        Ok(())
    }

    /// Pull candidates until one is accepted, then stop.
    ///
    /// The accepted pose is mapped to the gripper tip frame. `None` if the
    /// candidates run out first.
    pub fn find_grasp<I>(
        &self,
        candidates: I,
        image: &OrthographicImage,
        boundary: Option<&WorkspaceBoundary>,
        gripper: Option<&GripperSpec>,
    ) -> Option<Candidate>
    where
        I: IntoIterator<Item = Candidate>,
    {
        let refiner = self.refiner_for(gripper);
        let mut checked = 0usize;
        for candidate in candidates {
            checked += 1;
            let mut candidate = refiner.refine(image, candidate);
            match self.evaluate(image, &candidate, boundary) {
                Ok(()) => {
                    if let Some(gripper) = gripper {
                        candidate.pose = gripper.apply_tip_offset(candidate.pose);
                    }
                    tracing::info!(
                        "accepted grasp {} stroke {:.3} reward {:.3} after {} candidates",
                        candidate.pose,
                        candidate.stroke,
                        candidate.estimated_reward,
                        checked
                    );
                    return Some(candidate);
                }
                Err(reason) => {
                    tracing::trace!("rejected {:?} at {}: {}", candidate.index, candidate.pose, reason);
                }
            }
        }
        tracing::debug!("no safe grasp among {} candidates", checked);
        None
    }

    fn refiner_for(&self, gripper: Option<&GripperSpec>) -> Cow<'_, Refiner> {
        match gripper {
            Some(g) if g.finger_thickness() != self.refiner.config().tilt.finger_thickness => {
                let mut adjusted = self.refiner.clone();
                adjusted.config_mut().tilt.finger_thickness = g.finger_thickness();
                Cow::Owned(adjusted)
            }
            _ => Cow::Borrowed(&self.refiner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Pose;
    use crate::test_utils::{candidate_at, depth_map};
    use approx::assert_abs_diff_eq;

    fn bin() -> WorkspaceBoundary {
        WorkspaceBoundary::from_center_size([-0.002, -0.0065, 0.0], [0.174, 0.282, 0.0])
    }

    fn table() -> OrthographicImage {
        depth_map(400, 400, 1000.0, |_, _| Some(0.45))
    }

    fn with_reward(mut c: Candidate, reward: f32) -> Candidate {
        c.estimated_reward = reward;
        c
    }

    #[test]
    fn returns_first_inside_even_if_later_is_better() {
        let checker = SafetyChecker::new(Refiner::default(), CheckConfig::default());
        let candidates = vec![
            with_reward(candidate_at(Pose::planar(0.08, -0.01, 0.4), 0.05), 0.9),
            with_reward(candidate_at(Pose::planar(0.04, -0.01, 0.0), 0.05), 0.5),
            with_reward(candidate_at(Pose::planar(0.0, 0.0, 0.0), 0.05), 0.95),
        ];
        let grasp = checker
            .find_grasp(candidates, &table(), Some(&bin()), None)
            .unwrap();
        assert_eq!(grasp.estimated_reward, 0.5);
        assert_abs_diff_eq!(grasp.pose.z, 0.45 - 0.03, epsilon = 1e-4);
    }

    #[test]
    fn none_when_every_candidate_is_outside() {
        let checker = SafetyChecker::new(Refiner::default(), CheckConfig::default());
        let candidates = vec![
            candidate_at(Pose::planar(0.08, -0.01, 0.4), 0.05),
            candidate_at(Pose::planar(0.02, -0.18, -1.0), 0.01),
        ];
        assert!(checker
            .find_grasp(candidates, &table(), Some(&bin()), None)
            .is_none());
    }

    #[test]
    fn unmeasurable_depth_is_rejected() {
        let checker = SafetyChecker::new(Refiner::default(), CheckConfig::default());
        let empty = depth_map(400, 400, 1000.0, |_, _| None);
        let candidate = checker.refiner().refine(&empty, candidate_at(Pose::identity(), 0.05));
        assert_eq!(
            checker.evaluate(&empty, &candidate, None),
            Err(Rejection::NonFinitePose)
        );
        assert!(checker
            .find_grasp(vec![candidate_at(Pose::identity(), 0.05)], &empty, None, None)
            .is_none());
    }

    #[test]
    fn no_boundary_accepts_any_finite_pose() {
        let checker = SafetyChecker::new(Refiner::default(), CheckConfig::default());
        let grasp = checker
            .find_grasp(
                vec![candidate_at(Pose::planar(0.15, 0.15, 0.2), 0.05)],
                &table(),
                None,
                None,
            )
            .unwrap();
        assert!(grasp.pose.is_finite());
    }

    #[test]
    fn tip_offset_is_applied_to_accepted_pose() {
        let checker = SafetyChecker::new(Refiner::default(), CheckConfig::default());
        let gripper = GripperSpec::new(0.0, 0.1).with_tip_offset(Pose::new(0.0, 0.0, -0.02, 0.0, 0.0, 0.0));
        let grasp = checker
            .find_grasp(
                vec![candidate_at(Pose::identity(), 0.05)],
                &table(),
                Some(&bin()),
                Some(&gripper),
            )
            .unwrap();
        assert_abs_diff_eq!(grasp.pose.z, 0.42 - 0.02, epsilon = 1e-4);
    }

    struct AlwaysCollides;

    impl CollisionCheck for AlwaysCollides {
        fn collides(&self, _image: &OrthographicImage, _candidate: &Candidate) -> bool {
            true
        }
    }

    #[test]
    fn gripper_finger_thickness_overrides_tilt_strip() {
        let checker = SafetyChecker::new(Refiner::default(), CheckConfig::default());
        assert!(matches!(checker.refiner_for(None), Cow::Borrowed(_)));
        let standard = GripperSpec::new(0.0, 0.1);
        assert!(matches!(checker.refiner_for(Some(&standard)), Cow::Borrowed(_)));

        let thick = GripperSpec::new(0.0, 0.1).with_finger_thickness(0.01);
        let adjusted = checker.refiner_for(Some(&thick));
        assert_eq!(adjusted.config().tilt.finger_thickness, 0.01);
        assert_eq!(checker.refiner().config().tilt.finger_thickness, 0.004);
    }

    #[test]
    fn collision_check_can_veto() {
        let checker = SafetyChecker::new(Refiner::default(), CheckConfig::default())
            .with_collision_check(Box::new(AlwaysCollides));
        let mut candidate = checker
            .refiner()
            .refine(&table(), candidate_at(Pose::identity(), 0.05));
        assert_eq!(
            checker.evaluate(&table(), &candidate, None),
            Err(Rejection::Collision)
        );
        candidate.pose.z = f64::NAN;
        assert_eq!(
            checker.evaluate(&table(), &candidate, None),
            Err(Rejection::NonFinitePose)
        );
    }

    #[test]
    fn stops_pulling_after_acceptance() {
        let checker = SafetyChecker::new(Refiner::default(), CheckConfig::default());
        let mut pulled = 0;
        let stream = (0..100).map(|_| {
            pulled += 1;
            candidate_at(Pose::identity(), 0.05)
        });
        assert!(checker.find_grasp(stream, &table(), None, None).is_some());
        assert_eq!(pulled, 1);
    }
}
