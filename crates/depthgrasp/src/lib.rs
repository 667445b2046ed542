//! depthgrasp: grasp selection from orthographic depth images.
//!
//! A scoring model proposes grasp locations; this crate prepares the model's
//! input and turns its output into a single executable grasp:
//!
//! 1. **Sample**: one rotated, rescaled view per candidate yaw
//!    ([`MultiViewSampler`]), everything outside the workspace painted with the
//!    boundary's edge color.
//! 2. **Score**: one call to the external [`ScoringModel`].
//! 3. **Generate**: a lazy best-first stream of candidates over the reward
//!    tensor ([`CandidateGenerator`], driven by a [`SelectionMethod`]).
//! 4. **Refine**: grasp depth and lateral tilt measured directly from the
//!    depth channel ([`Refiner`]).
//! 5. **Check**: finiteness and workspace containment ([`SafetyChecker`]);
//!    the first accepted candidate wins.
//!
//! # Public API
//! - [`GraspPlanner`] as the primary entry point
//! - [`GraspConfig`] and [`ModelSpec`] for tuning
//! - image, pose, workspace and candidate types

mod check;
mod config;
mod error;
mod generator;
mod geometry;
mod image;
mod model;
mod planner;
mod refine;
mod sampler;
mod selection;
mod workspace;

#[cfg(test)]
mod test_utils;

pub use check::{CheckConfig, CollisionCheck, Rejection, SafetyChecker};
pub use config::GraspConfig;
pub use error::{GraspError, ModelError, Result};
pub use generator::{CandidateGenerator, GeneratorConfig};
pub use geometry::{point_in_polygon, Pose};
pub use self::image::{
    AreaOfInterest, DepthImageBuffer, Interpolation, OrthographicImage, DEPTH_CHANNEL, MAX_VALUE,
};
pub use model::{InputChannels, ModelArchitecture, ModelOutput, ModelSpec, ReplayModel, ScoringModel};
pub use planner::GraspPlanner;
pub use refine::{RefineConfig, Refiner, TiltConfig};
pub use sampler::{fill_outside_boundary, orientation_angles, MultiViewSampler, SamplerConfig, ViewBatch, ViewLayout};
pub use selection::SelectionMethod;
pub use workspace::{GripperSpec, WorkspaceBoundary};

/// Wall-clock durations of the stages that produced a candidate (seconds).
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Timings {
    /// View sampling.
    pub preprocess_s: f64,
    /// Model inference.
    pub inference_s: f64,
    /// Selection of this candidate.
    pub selection_s: f64,
}

impl Timings {
    /// Sum of all stages.
    pub fn total(&self) -> f64 {
        self.preprocess_s + self.inference_s + self.selection_s
    }
}

/// A grasp candidate taken from the reward tensor.
///
/// Freshly generated candidates carry `pose.z = NaN` unless the model predicts
/// depth; [`Refiner::refine`] fills it in.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Candidate {
    /// Grasp pose in the workspace frame.
    pub pose: Pose,
    /// Index into the stroke table.
    pub stroke_index: usize,
    /// Gripper opening (m).
    pub stroke: f64,
    /// Model reward at the selected cell.
    pub estimated_reward: f32,
    /// Reward tensor index `[orientation, row, col, stroke]`.
    pub index: [usize; 4],
    /// `(z, b, c)` predicted by a two-head model, if any.
    pub model_action: Option<[f32; 3]>,
    /// Name of the selection method that picked this candidate.
    pub method: String,
    /// Stage durations.
    pub timings: Timings,
}
