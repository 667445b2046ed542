//! Lazy candidate generation over the model's reward tensor.
//!
//! The model runs once per search. Afterwards every call to
//! [`Iterator::next`] disables the previously yielded cell, picks the next one
//! with the configured [`SelectionMethod`] and maps it back to a pose. The
//! iterator ends when the policy finds nothing selectable or after as many
//! steps as the tensor has cells, whichever comes first. Dropping it stops the
//! search.

use std::time::Instant;

use image::{ImageBuffer, Luma};
use ndarray::{s, Array4, ArrayD, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{GraspError, Result};
use crate::image::OrthographicImage;
use crate::model::{ModelOutput, ScoringModel};
use crate::sampler::{MultiViewSampler, ViewLayout};
use crate::selection::SelectionMethod;
use crate::workspace::{GripperSpec, WorkspaceBoundary};
use crate::{Candidate, Timings};

/// Tuning of the candidate search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Gaussian sigma (in output cells) applied to each reward plane before selection.
    pub gaussian_sigma: Option<f32>,
    /// Seed for the stochastic selection methods; `None` seeds from the OS.
    pub seed: Option<u64>,
}

/// Iterator over grasp candidates, best first according to the selection method.
#[derive(Debug)]
pub struct CandidateGenerator {
    reward: ArrayD<f32>,
    action: Option<Array4<f32>>,
    shape: [usize; 4],
    layout: ViewLayout,
    strokes: Vec<f64>,
    method: SelectionMethod,
    rng: StdRng,
    pending: Option<usize>,
    remaining: usize,
    timings: Timings,
}

impl CandidateGenerator {
    /// Sample views of `image`, run `model` once and prepare the search.
    #[allow(clippy::too_many_arguments)]
    pub fn run<M: ScoringModel + ?Sized>(
        sampler: &MultiViewSampler,
        image: &OrthographicImage,
        boundary: Option<&WorkspaceBoundary>,
        model: &mut M,
        strokes: &[f64],
        method: SelectionMethod,
        gripper: Option<&GripperSpec>,
        config: &GeneratorConfig,
    ) -> Result<Self> {
        method.validate()?;

        let start = Instant::now();
        let batch = sampler.sample(image, boundary)?;
        let preprocess_s = start.elapsed().as_secs_f64();

        let start = Instant::now();
        let output = model.predict(batch.tensor.view()).map_err(GraspError::Model)?;
        let inference_s = start.elapsed().as_secs_f64();

        tracing::debug!(
            "inference on {:?} returned reward {:?} in {:.3}s",
            batch.tensor.shape(),
            output.reward.shape(),
            inference_s
        );

        let timings = Timings {
            preprocess_s,
            inference_s,
            selection_s: 0.0,
        };
        Self::from_output(output, batch.layout, strokes, method, gripper, config, timings)
    }

    /// Prepare the search over an existing model output.
    pub fn from_output(
        output: ModelOutput,
        layout: ViewLayout,
        strokes: &[f64],
        method: SelectionMethod,
        gripper: Option<&GripperSpec>,
        config: &GeneratorConfig,
        timings: Timings,
    ) -> Result<Self> {
        method.validate()?;
        let ModelOutput { mut reward, action } = output;

        let dim = reward.dim();
        let shape = [dim.0, dim.1, dim.2, dim.3];
        let orientations = layout.angles().len();
        if shape[0] != orientations {
            return Err(GraspError::ModelShape {
                tensor: "reward",
                expected: vec![orientations, shape[1], shape[2], strokes.len()],
                got: shape.to_vec(),
            });
        }
        if shape[3] != strokes.len() {
            return Err(GraspError::StrokeTable {
                table: strokes.len(),
                tensor: shape[3],
            });
        }
        if let Some(action) = &action {
            let expected = [shape[0], shape[1], shape[2], 3];
            if action.shape() != expected {
                return Err(GraspError::ModelShape {
                    tensor: "action",
                    expected: expected.to_vec(),
                    got: action.shape().to_vec(),
                });
            }
        }

        if let Some(sigma) = config.gaussian_sigma.filter(|s| s.is_finite() && *s > 0.0) {
            smooth_planes(&mut reward, sigma);
        }

        if let Some(gripper) = gripper {
            let impossible = method.impossible_value();
            for (k, feasible) in gripper.stroke_mask(strokes).into_iter().enumerate() {
                if !feasible {
                    reward.index_axis_mut(Axis(3), k).fill(impossible);
                }
            }
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            remaining: reward.len(),
            reward: reward.into_dyn(),
            action,
            shape,
            layout,
            strokes: strokes.to_vec(),
            method,
            rng,
            pending: None,
            timings,
        })
    }

    /// Shape of the reward tensor `[orientations, rows, cols, strokes]`.
    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    /// View geometry used to map cells to poses.
    pub fn layout(&self) -> &ViewLayout {
        &self.layout
    }

    /// Upper bound on the number of candidates still to come.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    fn unravel(&self, flat: usize) -> [usize; 4] {
        let [_, rows, cols, strokes] = self.shape;
        let s = flat % strokes;
        let c = (flat / strokes) % cols;
        let r = (flat / (strokes * cols)) % rows;
        let n = flat / (strokes * cols * rows);
        [n, r, c, s]
    }

    fn candidate_at(&self, flat: usize, selection_s: f64) -> Candidate {
        let index = self.unravel(flat);
        let [n, r, c, k] = index;
        let mut pose = self.layout.pose_at(n, r, c, self.shape[1], self.shape[2]);

        let model_action = self.action.as_ref().map(|action| {
            let a = action.slice(s![n, r, c, ..]);
            [a[0], a[1], a[2]]
        });
        if let Some([z, b, c]) = model_action {
            pose.z = z as f64;
            pose.b = b as f64;
            pose.c = c as f64;
        }

        let reward = self.reward.as_slice().map_or_else(
            || self.reward.iter().nth(flat).copied().unwrap_or(f32::NAN),
            |slice| slice[flat],
        );

        Candidate {
            pose,
            stroke_index: k,
            stroke: self.strokes[k],
            estimated_reward: reward,
            index,
            model_action,
            method: self.method.to_string(),
            timings: Timings {
                selection_s,
                ..self.timings
            },
        }
    }
}

impl Iterator for CandidateGenerator {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        if let Some(previous) = self.pending.take() {
            self.method.disable(previous, &mut self.reward);
        }
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let start = Instant::now();
        let Some(flat) = self.method.pick(&self.reward, &mut self.rng) else {
            tracing::debug!("{} found no selectable cell; search exhausted", self.method);
            self.remaining = 0;
            return None;
        };
        let candidate = self.candidate_at(flat, start.elapsed().as_secs_f64());
        self.pending = Some(flat);
        Some(candidate)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

/// Gaussian-smooth every `(orientation, stroke)` plane of the reward tensor.
fn smooth_planes(reward: &mut Array4<f32>, sigma: f32) {
    let (n, rows, cols, strokes) = reward.dim();
    for k in 0..n {
        for st in 0..strokes {
            let mut plane = reward.slice_mut(s![k, .., .., st]);
            let buf = ImageBuffer::<Luma<f32>, Vec<f32>>::from_fn(cols as u32, rows as u32, |x, y| {
                Luma([plane[[y as usize, x as usize]]])
            });
            let blurred = imageproc::filter::gaussian_blur_f32(&buf, sigma);
            for ((r, c), v) in plane.indexed_iter_mut() {
                *v = blurred.get_pixel(c as u32, r as u32)[0];
            }
        }
    }
}
