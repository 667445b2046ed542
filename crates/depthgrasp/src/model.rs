//! Scoring-model interface and model description.
//!
//! The scoring model is opaque: it receives one view per sampled orientation
//! (`[N, H, W, C]`, values in `[0, 1]`) and returns a reward per
//! `(orientation, row, col, stroke)` cell. Two-head models additionally return
//! a continuous `(z, b, c)` action per `(orientation, row, col)` cell.

use std::path::Path;

use ndarray::{Array4, ArrayView4};
use serde::{Deserialize, Serialize};

use crate::error::{read_json, GraspError, ModelError, Result};

/// Raw output of one inference call.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    /// Reward tensor `[N, rows, cols, strokes]`.
    pub reward: Array4<f32>,
    /// Optional action tensor `[N, rows, cols, 3]` holding `(z, b, c)`.
    pub action: Option<Array4<f32>>,
}

impl ModelOutput {
    /// Output of a single-head model.
    pub fn reward_only(reward: Array4<f32>) -> Self {
        Self {
            reward,
            action: None,
        }
    }

    /// Output of a two-head (actor-critic) model.
    pub fn with_action(reward: Array4<f32>, action: Array4<f32>) -> Self {
        Self {
            reward,
            action: Some(action),
        }
    }
}

/// A grasp scoring model.
///
/// Any closure `FnMut(ArrayView4<f32>) -> Result<ModelOutput, ModelError>`
/// implements this trait.
pub trait ScoringModel {
    /// Score a batch of views.
    fn predict(&mut self, views: ArrayView4<'_, f32>) -> std::result::Result<ModelOutput, ModelError>;
}

impl<F> ScoringModel for F
where
    F: FnMut(ArrayView4<'_, f32>) -> std::result::Result<ModelOutput, ModelError>,
{
    fn predict(&mut self, views: ArrayView4<'_, f32>) -> std::result::Result<ModelOutput, ModelError> {
        self(views)
    }
}

/// A model that returns a previously recorded output, whatever the input.
#[derive(Debug, Clone)]
pub struct ReplayModel {
    output: ModelOutput,
}

impl ReplayModel {
    /// Replay `output` on every call.
    pub fn new(output: ModelOutput) -> Self {
        Self { output }
    }
}

impl ScoringModel for ReplayModel {
    fn predict(&mut self, _views: ArrayView4<'_, f32>) -> std::result::Result<ModelOutput, ModelError> {
        Ok(self.output.clone())
    }
}

/// How the model's output is turned into a full grasp pose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelArchitecture {
    /// Reward only; z from depth, b = c = 0.
    #[default]
    Planar,
    /// Reward only; z, b and c from depth.
    Lateral,
    /// Reward plus a `(z, b, c)` action head.
    #[serde(alias = "actor-critic")]
    ActorCritic,
}

/// Channels fed to the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputChannels {
    /// Depth channel only.
    #[default]
    Depth,
    /// Three color channels followed by depth.
    ColorDepth,
}

impl InputChannels {
    /// Number of channels per view.
    pub fn count(self) -> usize {
        match self {
            Self::Depth => 1,
            Self::ColorDepth => 4,
        }
    }
}

/// Description of a trained scoring model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSpec {
    /// Model name.
    pub name: String,
    /// Output interpretation.
    pub architecture: ModelArchitecture,
    /// Receptive field of one output cell in source pixels `[width, height]`.
    pub size_area_cropped: [f64; 2],
    /// Output pixels spanned by that receptive field `[width, height]`.
    pub size_result: [f64; 2],
    /// Stroke (m) for each stroke index of the reward tensor.
    #[serde(alias = "gripper_widths")]
    pub strokes: Vec<f64>,
    /// View pixels per output cell.
    pub output_stride: f64,
    /// Channels per view.
    pub input_channels: InputChannels,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            name: "planar".to_string(),
            architecture: ModelArchitecture::Planar,
            size_area_cropped: [200.0, 200.0],
            size_result: [32.0, 32.0],
            strokes: vec![0.025, 0.05, 0.07, 0.086],
            output_stride: 2.0,
            input_channels: InputChannels::Depth,
        }
    }
}

impl ModelSpec {
    /// Load and validate a model description from JSON.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let spec: Self = read_json(path)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Check sizes and the stroke table.
    pub fn validate(&self) -> Result<()> {
        let [cw, ch] = self.size_area_cropped;
        let [rw, rh] = self.size_result;
        for [w, h] in [self.size_area_cropped, self.size_result] {
            if !(w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0) {
                return Err(GraspError::InvalidAreaSize {
                    width: w,
                    height: h,
                });
            }
        }
        let scale_x = rw / cw;
        let scale_y = rh / ch;
        if (scale_x - scale_y).abs() > 1e-9 * scale_x.max(scale_y) {
            return Err(GraspError::AnisotropicScale { scale_x, scale_y });
        }
        if !(self.output_stride.is_finite() && self.output_stride > 0.0) {
            return Err(GraspError::InvalidAreaSize {
                width: self.output_stride,
                height: self.output_stride,
            });
        }
        if self.strokes.is_empty() {
            return Err(GraspError::StrokeTable {
                table: 0,
                tensor: 0,
            });
        }
        Ok(())
    }

    /// View pixels per source pixel.
    pub fn scale(&self) -> f64 {
        self.size_result[0] / self.size_area_cropped[0]
    }
}
