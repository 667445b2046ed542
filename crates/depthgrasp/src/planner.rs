//! High-level grasp planning API.
//!
//! [`GraspPlanner`] is the primary entry point. It wraps a [`ModelSpec`] and a
//! [`GraspConfig`] and runs the sample, score, generate, refine and check
//! stages for one image at a time.

use std::path::Path;

use crate::check::SafetyChecker;
use crate::config::GraspConfig;
use crate::error::Result;
use crate::generator::CandidateGenerator;
use crate::image::OrthographicImage;
use crate::model::{ModelSpec, ScoringModel};
use crate::refine::Refiner;
use crate::sampler::{MultiViewSampler, ViewBatch};
use crate::selection::SelectionMethod;
use crate::workspace::{GripperSpec, WorkspaceBoundary};
use crate::Candidate;

/// Primary grasp planning interface.
///
/// Create once per model, plan on many images.
///
/// # Examples
///
/// ```no_run
/// use depthgrasp::{GraspPlanner, ModelOutput, ModelSpec, OrthographicImage, SelectionMethod};
/// use ndarray::{Array4, ArrayView4};
///
/// # fn load() -> OrthographicImage { unimplemented!() }
/// let planner = GraspPlanner::new(ModelSpec::default()).unwrap();
/// let image = load();
/// let mut model = |views: ArrayView4<'_, f32>| -> Result<ModelOutput, depthgrasp::ModelError> {
///     let n = views.shape()[0];
///     Ok(ModelOutput::reward_only(Array4::zeros((n, 8, 8, 4))))
/// };
/// let grasp = planner
///     .find_safe_grasp(&image, &mut model, SelectionMethod::Max, None, None)
///     .unwrap();
/// println!("{grasp:?}");
/// ```
#[derive(Debug, Clone)]
pub struct GraspPlanner {
    model: ModelSpec,
    config: GraspConfig,
}

impl GraspPlanner {
    /// Create a planner with configuration defaults for `model`.
    pub fn new(model: ModelSpec) -> Result<Self> {
        let config = GraspConfig::for_model(&model);
        Self::with_config(model, config)
    }

    /// Create with full config control.
    pub fn with_config(model: ModelSpec, config: GraspConfig) -> Result<Self> {
        model.validate()?;
        config.validate()?;
        Ok(Self { model, config })
    }

    /// Load a model description from JSON and create a planner for it.
    pub fn from_model_json_file(path: &Path) -> Result<Self> {
        Self::new(ModelSpec::from_json_file(path)?)
    }

    /// The model description.
    pub fn model(&self) -> &ModelSpec {
        &self.model
    }

    /// Access the current configuration.
    pub fn config(&self) -> &GraspConfig {
        &self.config
    }

    /// Mutable access to configuration for post-construction tuning.
    pub fn config_mut(&mut self) -> &mut GraspConfig {
        &mut self.config
    }

    fn sampler(&self) -> Result<MultiViewSampler> {
        MultiViewSampler::new(self.config.sampler.clone(), &self.model)
    }

    fn checker(&self) -> SafetyChecker {
        SafetyChecker::new(Refiner::new(self.config.refine.clone()), self.config.check.clone())
    }

    /// The view batch the model would receive for `image`.
    pub fn input_batch(
        &self,
        image: &OrthographicImage,
        boundary: Option<&WorkspaceBoundary>,
    ) -> Result<ViewBatch> {
        self.sampler()?.sample(image, boundary)
    }

    /// Run `model` once on `image` and return the lazy candidate stream.
    pub fn generate_candidates<M: ScoringModel + ?Sized>(
        &self,
        image: &OrthographicImage,
        model: &mut M,
        method: SelectionMethod,
        boundary: Option<&WorkspaceBoundary>,
        gripper: Option<&GripperSpec>,
    ) -> Result<CandidateGenerator> {
        if let Some(gripper) = gripper {
            gripper.validate()?;
        }
        CandidateGenerator::run(
            &self.sampler()?,
            image,
            boundary,
            model,
            &self.model.strokes,
            method,
            gripper,
            &self.config.generator,
        )
    }

    /// The first candidate that survives refinement and the safety check.
    ///
    /// `Ok(None)` if no candidate is acceptable.
    pub fn find_safe_grasp<M: ScoringModel + ?Sized>(
        &self,
        image: &OrthographicImage,
        model: &mut M,
        method: SelectionMethod,
        boundary: Option<&WorkspaceBoundary>,
        gripper: Option<&GripperSpec>,
    ) -> Result<Option<Candidate>> {
        let candidates = self.generate_candidates(image, model, method, boundary, gripper)?;
        Ok(self.checker().find_grasp(candidates, image, boundary, gripper))
    }

    /// Fill in depth (and tilt, for lateral models) of a candidate.
    pub fn refine(&self, image: &OrthographicImage, candidate: Candidate) -> Candidate {
        Refiner::new(self.config.refine.clone()).refine(image, candidate)
    }
}
