//! Training/validation partition of an experiment's points.
//!
//! For each dataset `floor(frac * n)` points go to training. Membership is a
//! shuffled boolean mask, so the partition is a pure function of the
//! experiment name, the replica seed and the fractions. Points are tagged by
//! index; nothing is copied.

use rand::prelude::*;
use rand::rngs::StdRng;
use serde::Serialize;

use crate::error::AppError;
use crate::experiment::aggregate::Experiment;
use crate::math::fnv1a64;

/// Sorted, disjoint index sets into `Experiment::points()`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TrainValidSplit {
    pub train: Vec<usize>,
    pub valid: Vec<usize>,
}

impl TrainValidSplit {
    pub fn len(&self) -> usize {
        self.train.len() + self.valid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when every index in `0..n` appears in exactly one subset.
    pub fn covers(&self, n: usize) -> bool {
        let mut seen = vec![false; n];
        for &i in self.train.iter().chain(self.valid.iter()) {
            if i >= n || seen[i] {
                return false;
            }
            seen[i] = true;
        }
        seen.into_iter().all(|s| s)
    }
}

/// Split `experiment` with one training fraction per dataset.
pub fn split(experiment: &Experiment, seed: u64, fracs: &[f64]) -> Result<TrainValidSplit, AppError> {
    let datasets = experiment.datasets();
    if fracs.len() != datasets.len() {
        return Err(AppError::new(
            4,
            format!(
                "Experiment {}: {} training fractions for {} datasets.",
                experiment.name(),
                fracs.len(),
                datasets.len()
            ),
        ));
    }
    if let Some(bad) = fracs.iter().find(|f| !(f.is_finite() && (0.0..=1.0).contains(*f))) {
        return Err(AppError::new(
            2,
            format!("Experiment {}: training fraction {bad} is outside [0, 1].", experiment.name()),
        ));
    }

    let mut rng = StdRng::seed_from_u64(name_seed(experiment.name()).wrapping_add(seed));
    let mut out = TrainValidSplit::default();

    for (range, &frac) in experiment.dataset_ranges().into_iter().zip(fracs) {
        let n = range.len();
        let n_train = ((frac * n as f64).floor() as usize).min(n);
        let mut mask: Vec<bool> = (0..n).map(|i| i < n_train).collect();
        mask.shuffle(&mut rng);

        for (offset, is_train) in mask.into_iter().enumerate() {
            let idx = range.start + offset;
            if is_train {
                out.train.push(idx);
            } else {
                out.valid.push(idx);
            }
        }
    }

    Ok(out)
}

/// Same fraction for every dataset of the experiment.
pub fn split_uniform(experiment: &Experiment, seed: u64, frac: f64) -> Result<TrainValidSplit, AppError> {
    split(experiment, seed, &vec![frac; experiment.datasets().len()])
}

fn name_seed(name: &str) -> u64 {
    fnv1a64(name.as_bytes()) % 100_000_000
}
