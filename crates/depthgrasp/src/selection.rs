//! Selection policies over a reward tensor.
//!
//! A policy picks the next flat index (row-major, over all axes) and can
//! disable an index so that it is never picked again. Disabling writes the
//! policy's impossible value into the cell: `-inf` for the ranking policies and
//! `0` for the probability-weighted one.

use std::fmt;

use ndarray::ArrayD;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{GraspError, Result};

/// How the next candidate is chosen from the reward tensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum SelectionMethod {
    /// Global arg-max (first one on ties).
    #[default]
    Max,
    /// Uniformly random among the `n` largest entries.
    Top {
        /// Number of best entries to choose from.
        n: usize,
    },
    /// Sample proportionally to `reward^power`.
    PowerProb {
        /// Exponent applied to each reward.
        power: f32,
    },
    /// Uniformly random, ignoring rewards. Never exhausts.
    Random,
}

impl SelectionMethod {
    /// Check parameters.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Top { n } if n == 0 => Err(GraspError::InvalidSelection(
                "Top needs n >= 1".to_string(),
            )),
            Self::PowerProb { power } if !(power.is_finite() && power > 0.0) => Err(
                GraspError::InvalidSelection(format!("PowerProb needs a positive power, got {power}")),
            ),
            _ => Ok(()),
        }
    }

    /// Value that marks a cell as never selectable.
    pub fn impossible_value(&self) -> f32 {
        match self {
            Self::PowerProb { .. } => 0.0,
            _ => f32::NEG_INFINITY,
        }
    }

    /// Pick the next flat index, or `None` if no selectable entry remains.
    pub fn pick<R: Rng + ?Sized>(&self, tensor: &ArrayD<f32>, rng: &mut R) -> Option<usize> {
        match *self {
            Self::Max => pick_max(tensor),
            Self::Top { n } => pick_top(tensor, n, rng),
            Self::PowerProb { power } => pick_power(tensor, power, rng),
            Self::Random => {
                let candidates: Vec<usize> = selectable(tensor).map(|(i, _)| i).collect();
                if candidates.is_empty() {
                    None
                } else {
                    Some(candidates[rng.gen_range(0..candidates.len())])
                }
            }
        }
    }

    /// Make `index` unselectable. A no-op for [`SelectionMethod::Random`].
    pub fn disable(&self, index: usize, tensor: &mut ArrayD<f32>) {
        if matches!(self, Self::Random) {
            return;
        }
        let value = self.impossible_value();
        match tensor.as_slice_mut() {
            Some(slice) => {
                if let Some(cell) = slice.get_mut(index) {
                    *cell = value;
                }
            }
            None => {
                if let Some(cell) = tensor.iter_mut().nth(index) {
                    *cell = value;
                }
            }
        }
    }
}

impl fmt::Display for SelectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Max => write!(f, "Max"),
            Self::Top { n } => write!(f, "Top{n}"),
            Self::PowerProb { power } => write!(f, "PowerProb{power}"),
            Self::Random => write!(f, "Random"),
        }
    }
}

/// Entries that are neither NaN nor `-inf`, in logical order.
fn selectable(tensor: &ArrayD<f32>) -> impl Iterator<Item = (usize, f32)> + '_ {
    tensor
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| !v.is_nan() && *v != f32::NEG_INFINITY)
}

fn pick_max(tensor: &ArrayD<f32>) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, v) in selectable(tensor) {
        if best.map_or(true, |(_, b)| v > b) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
}

fn pick_top<R: Rng + ?Sized>(tensor: &ArrayD<f32>, n: usize, rng: &mut R) -> Option<usize> {
    let mut entries: Vec<(usize, f32)> = selectable(tensor).collect();
    if entries.is_empty() || n == 0 {
        return None;
    }
    if entries.len() > n {
        entries.select_nth_unstable_by(n - 1, |a, b| b.1.total_cmp(&a.1));
        entries.truncate(n);
    }
    Some(entries[rng.gen_range(0..entries.len())].0)
}

fn pick_power<R: Rng + ?Sized>(tensor: &ArrayD<f32>, power: f32, rng: &mut R) -> Option<usize> {
    let (indices, weights): (Vec<usize>, Vec<f64>) = tensor
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite() && **v > 0.0)
        .map(|(i, &v)| (i, (v as f64).powf(power as f64)))
        .filter(|(_, w)| w.is_finite() && *w > 0.0)
        .unzip();
    let dist = WeightedIndex::new(&weights).ok()?;
    Some(indices[dist.sample(rng)])
}
