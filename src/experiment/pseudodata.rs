//! Monte Carlo pseudo-data replicas.
//!
//! A replica is `central + L z` where `L` is the lower Cholesky factor of the
//! covariance of every fitted experiment together and `z` a vector of standard
//! normal draws. One draw covers all experiments, so a systematic shared
//! between experiments moves them together. For experiments whose central
//! values are all positive (cross sections), draws with a negative entry there
//! are rejected and resampled.

use std::ops::Range;

use nalgebra::DVector;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::error::AppError;
use crate::experiment::aggregate::ExperimentSet;
use crate::math::lower_factor;

const MAX_ATTEMPTS: usize = 100;

/// Fluctuated central values for one replica, in `ExperimentSet::points()` order.
pub fn generate_replica(set: &ExperimentSet, seed: u64) -> Result<DVector<f64>, AppError> {
    let central = set.central_values();
    let n = central.len();

    let l = lower_factor(set.covariance())
        .ok_or_else(|| AppError::new(4, "Covariance matrix of the fitted experiments is not positive definite."))?;

    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;

    let positive: Vec<Range<usize>> = set
        .ranges()
        .into_iter()
        .filter(|r| central.rows_range(r.clone()).iter().all(|&c| c > 0.0))
        .collect();

    for _ in 0..MAX_ATTEMPTS {
        let z = DVector::from_iterator(n, (0..n).map(|_| normal.sample(&mut rng)));
        let replica = &central + &l * z;
        if positive
            .iter()
            .all(|r| replica.rows_range(r.clone()).iter().all(|&v| v > 0.0))
        {
            return Ok(replica);
        }
    }

    Err(AppError::new(
        4,
        format!("Could not generate a positive pseudo-data replica after {MAX_ATTEMPTS} attempts."),
    ))
}

/// Central values, or a fluctuated replica when `genrep` is set.
pub fn replica_values(set: &ExperimentSet, mcseed: Option<u64>) -> Result<DVector<f64>, AppError> {
    match mcseed {
        Some(seed) => generate_replica(set, seed),
        None => Ok(set.central_values()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CMS_LUMI_13;
    use crate::domain::{DataPoint, Dataset, Kinematics, SystematicUncertainty};
    use crate::experiment::Experiment;

    fn experiment(stat: f64) -> ExperimentSet {
        experiment_with(&[100.0, 200.0, 300.0], stat)
    }

    fn experiment_with(centrals: &[f64], stat: f64) -> ExperimentSet {
        let points = centrals
            .iter()
            .map(|&c| DataPoint {
                kinematics: Kinematics::default(),
                central: c,
                stat,
                systematics: vec![SystematicUncertainty::multiplicative("LUMI", 2.0, c)],
            })
            .collect();
        let ds = Dataset::new("D", "INC", centrals.len(), 1, points).unwrap();
        ExperimentSet::new(vec![Experiment::from_datasets("EXP", vec![ds]).unwrap()]).unwrap()
    }

    /// One point at 100 with stat 0.1 and a 5% 13 TeV luminosity.
    fn lumi_dominated(experiment: &str, dataset: &str) -> Experiment {
        let point = DataPoint {
            kinematics: Kinematics::default(),
            central: 100.0,
            stat: 0.1,
            systematics: vec![SystematicUncertainty::multiplicative(CMS_LUMI_13, 5.0, 100.0)],
        };
        let ds = Dataset::new(dataset, "INC", 1, 1, vec![point]).unwrap();
        Experiment::from_datasets(experiment, vec![ds]).unwrap()
    }

    #[test]
    fn same_seed_same_replica() {
        let set = experiment(5.0);
        let a = generate_replica(&set, 7).unwrap();
        let b = generate_replica(&set, 7).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, generate_replica(&set, 8).unwrap());
    }

    #[test]
    fn fluctuations_stay_near_central() {
        let set = experiment(1.0);
        let rep = generate_replica(&set, 11).unwrap();
        for (r, c) in rep.iter().zip(set.central_values().iter()) {
            // stat 1 and a 2% luminosity: ten sigma is far beyond this.
            assert!((r - c).abs() < 10.0 * (1.0 + 0.02 * c));
            assert!(*r > 0.0);
        }
    }

    #[test]
    fn without_seed_returns_central_values() {
        let set = experiment(1.0);
        assert_eq!(replica_values(&set, None).unwrap(), set.central_values());
    }

    #[test]
    fn impossible_positivity_fails() {
        // Sixty independent points with huge errors: a fully positive draw has
        // probability 2^-60 per attempt.
        let set = experiment_with(&[1.0; 60], 1.0e9);
        let err = generate_replica(&set, 1).unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn shared_luminosity_moves_experiments_together() {
        let set = ExperimentSet::new(vec![lumi_dominated("A", "DA"), lumi_dominated("B", "DB")]).unwrap();
        assert!((set.covariance()[(0, 1)] - 25.0).abs() < 1e-9);

        let draws: Vec<(f64, f64)> = (0..2000u64)
            .map(|seed| {
                let r = generate_replica(&set, seed).unwrap();
                (r[0] - 100.0, r[1] - 100.0)
            })
            .collect();
        let n = draws.len() as f64;
        let (ma, mb) = draws.iter().fold((0.0, 0.0), |acc, (a, b)| (acc.0 + a / n, acc.1 + b / n));
        let (mut sab, mut saa, mut sbb) = (0.0, 0.0, 0.0);
        for (a, b) in &draws {
            sab += (a - ma) * (b - mb);
            saa += (a - ma) * (a - ma);
            sbb += (b - mb) * (b - mb);
        }
        // Exact correlation is 25 / 25.01.
        assert!(sab / (saa * sbb).sqrt() > 0.99);
    }

    #[test]
    fn positivity_applies_per_experiment() {
        // A: one positive point one sigma from zero, rejected when negative.
        // ASYM: negative central value, free to fluctuate either way.
        let point = |central: f64| DataPoint {
            kinematics: Kinematics::default(),
            central,
            stat: 1.0,
            systematics: Vec::new(),
        };
        let single = |exp: &str, ds: &str, central: f64| {
            Experiment::from_datasets(exp, vec![Dataset::new(ds, "ASY", 1, 0, vec![point(central)]).unwrap()]).unwrap()
        };
        let set = ExperimentSet::new(vec![single("A", "DA", 1.0), single("ASYM", "DASYM", -0.5)]).unwrap();

        let mut saw_positive_asym = false;
        for seed in 0..50u64 {
            let r = generate_replica(&set, seed).unwrap();
            assert!(r[0] > 0.0);
            saw_positive_asym |= r[1] > 0.0;
        }
        assert!(saw_positive_asym);
    }
}
