//! Aggregate planner configuration with JSON loading.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::check::CheckConfig;
use crate::error::{read_json, Result};
use crate::generator::GeneratorConfig;
use crate::model::{ModelArchitecture, ModelSpec};
use crate::refine::RefineConfig;
use crate::sampler::SamplerConfig;

/// Top-level configuration of the grasp planner.
///
/// Every section falls back to its defaults when missing from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraspConfig {
    /// View batch construction.
    pub sampler: SamplerConfig,
    /// Candidate search.
    pub generator: GeneratorConfig,
    /// Depth and tilt refinement.
    pub refine: RefineConfig,
    /// Safety check.
    pub check: CheckConfig,
}

impl GraspConfig {
    /// Defaults adjusted to a model: lateral models get tilt estimation.
    pub fn for_model(model: &ModelSpec) -> Self {
        let mut config = Self::default();
        config.refine.lateral = model.architecture == ModelArchitecture::Lateral;
        config
    }

    /// Load from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let config: Self = read_json(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that would otherwise fail deep inside a search.
    pub fn validate(&self) -> Result<()> {
        crate::sampler::orientation_angles(self.sampler.orientations, self.sampler.angle_margin)?;
        Ok(())
    }
}
