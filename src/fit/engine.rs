//! Minimizer interface and the reference genetic minimizer.
//!
//! The replica state machine only sees the [`Minimizer`] trait: an opaque
//! handle that can be initialized from a seed, advanced by one step against
//! the training subsets, evaluated on any subset and snapshotted for logging.
//!
//! The reference implementation is a (1 + λ) genetic minimizer:
//! - λ mutants of the current parameters are drawn from the handle's RNG
//! - each candidate's total training chi² is evaluated (parallel)
//! - the best candidate survives; the parent is kept on ties

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::fit::chi2::SubsetData;
use crate::fit::model::{LogPolynomial, Parameterization};

pub trait Minimizer: Sync {
    type Handle: Clone + Send;

    fn initialize(&self, seed: u64) -> Result<Self::Handle, AppError>;

    /// Advance by one iteration, minimizing the summed chi² over `training`.
    fn step(&self, handle: Self::Handle, training: &[SubsetData]) -> Result<Self::Handle, AppError>;

    fn evaluate(&self, handle: &Self::Handle, subset: &SubsetData) -> f64;

    fn snapshot(&self, handle: &Self::Handle) -> PdfSnapshot;
}

/// Parameters of the fitted model at a given iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfSnapshot {
    pub iteration: usize,
    pub parameters: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MinimizerSettings {
    /// Degree of the log-energy polynomial.
    pub degree: usize,
    /// Energy (GeV) around which the polynomial is expanded.
    pub reference_energy: f64,
    /// Mutants drawn per generation.
    pub mutants: usize,
    /// Standard deviation of a mutation at generation 0.
    pub mutation_size: f64,
    /// Mutation size is multiplied by this factor every generation.
    pub mutation_decay: f64,
    /// Probability that a given parameter is mutated.
    pub mutation_probability: f64,
    /// Starting parameters (missing entries are zero).
    pub initial: Vec<f64>,
    /// Spread of the seeded perturbation applied to `initial`.
    pub initial_spread: f64,
}

impl Default for MinimizerSettings {
    fn default() -> Self {
        Self {
            degree: 2,
            reference_energy: 8000.0,
            mutants: 40,
            mutation_size: 0.5,
            mutation_decay: 0.99,
            mutation_probability: 0.5,
            initial: Vec::new(),
            initial_spread: 0.1,
        }
    }
}

impl MinimizerSettings {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.mutants == 0 {
            return Err(AppError::new(2, "Minimizer needs at least one mutant per generation."));
        }
        if !(self.reference_energy.is_finite() && self.reference_energy > 0.0) {
            return Err(AppError::new(2, "Reference energy must be positive."));
        }
        if !(self.mutation_size.is_finite() && self.mutation_size > 0.0) {
            return Err(AppError::new(2, "Mutation size must be positive."));
        }
        if !(self.mutation_decay > 0.0 && self.mutation_decay <= 1.0) {
            return Err(AppError::new(2, "Mutation decay must be in (0, 1]."));
        }
        if !(0.0..=1.0).contains(&self.mutation_probability) {
            return Err(AppError::new(2, "Mutation probability must be in [0, 1]."));
        }
        if !(self.initial_spread.is_finite() && self.initial_spread >= 0.0) {
            return Err(AppError::new(2, "Initial spread must be non-negative."));
        }
        if self.initial.len() > self.degree + 1 {
            return Err(AppError::new(
                2,
                format!(
                    "{} initial parameters given for a degree {} polynomial.",
                    self.initial.len(),
                    self.degree
                ),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct GaHandle {
    pub params: Vec<f64>,
    pub generation: usize,
    rng: StdRng,
}

#[derive(Debug, Clone)]
pub struct GeneticMinimizer<P> {
    model: P,
    settings: MinimizerSettings,
}

impl GeneticMinimizer<LogPolynomial> {
    pub fn from_settings(settings: &MinimizerSettings) -> Result<Self, AppError> {
        settings.validate()?;
        let model = LogPolynomial {
            degree: settings.degree,
            reference_energy: settings.reference_energy,
        };
        Ok(Self {
            model,
            settings: settings.clone(),
        })
    }
}

impl<P: Parameterization> GeneticMinimizer<P> {
    fn total_chi2(&self, params: &[f64], training: &[SubsetData]) -> f64 {
        training
            .iter()
            .map(|subset| subset.chi2(&self.model.predict_all(params, &subset.kinematics)))
            .sum()
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    idx: usize,
    params: Vec<f64>,
    chi2: f64,
}

impl<P: Parameterization> Minimizer for GeneticMinimizer<P> {
    type Handle = GaHandle;

    fn initialize(&self, seed: u64) -> Result<GaHandle, AppError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let n = self.model.n_params();
        let mut params = vec![0.0; n];
        for (p, v) in params.iter_mut().zip(&self.settings.initial) {
            *p = *v;
        }
        if self.settings.initial_spread > 0.0 {
            let normal = Normal::new(0.0, self.settings.initial_spread)
                .map_err(|e| AppError::new(4, format!("Initialization distribution error: {e}")))?;
            for p in &mut params {
                *p += normal.sample(&mut rng);
            }
        }
        Ok(GaHandle {
            params,
            generation: 0,
            rng,
        })
    }

    fn step(&self, mut handle: GaHandle, training: &[SubsetData]) -> Result<GaHandle, AppError> {
        let size = self.settings.mutation_size * self.settings.mutation_decay.powi(handle.generation as i32);
        let normal = Normal::new(0.0, size)
            .map_err(|e| AppError::new(4, format!("Mutation distribution error: {e}")))?;

        // Mutants are drawn sequentially so the RNG stream is independent of threading.
        let mut pool = Vec::with_capacity(self.settings.mutants + 1);
        pool.push(handle.params.clone());
        for _ in 0..self.settings.mutants {
            let mut child = handle.params.clone();
            for p in &mut child {
                if handle.rng.gen_bool(self.settings.mutation_probability) {
                    *p += normal.sample(&mut handle.rng);
                }
            }
            pool.push(child);
        }

        let candidates: Vec<Candidate> = pool
            .into_par_iter()
            .enumerate()
            .map(|(idx, params)| {
                let chi2 = self.total_chi2(&params, training);
                Candidate { idx, params, chi2 }
            })
            .collect();

        // Deterministic selection: minimum finite chi²; ties go to the lower index (the parent first).
        let mut best: Option<&Candidate> = None;
        for c in candidates.iter().filter(|c| c.chi2.is_finite()) {
            match best {
                Some(b) if c.chi2 > b.chi2 || (c.chi2 == b.chi2 && c.idx > b.idx) => {}
                _ => best = Some(c),
            }
        }

        if let Some(b) = best {
            handle.params = b.params.clone();
        }
        handle.generation += 1;
        Ok(handle)
    }

    fn evaluate(&self, handle: &GaHandle, subset: &SubsetData) -> f64 {
        subset.chi2(&self.model.predict_all(&handle.params, &subset.kinematics))
    }

    fn snapshot(&self, handle: &GaHandle) -> PdfSnapshot {
        PdfSnapshot {
            iteration: handle.generation,
            parameters: handle.params.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DataPoint, Dataset, Kinematics};
    use crate::experiment::Experiment;

    fn power_law_experiment() -> Experiment {
        // σ = 250 (√s / 8 TeV)^2
        let points = [5000.0, 7000.0, 8000.0, 13000.0]
            .iter()
            .map(|&e: &f64| {
                let central = 250.0 * (e / 8000.0).powi(2);
                DataPoint {
                    kinematics: Kinematics { k1: 0.0, k2: 0.0, k3: e },
                    central,
                    stat: 0.02 * central,
                    systematics: Vec::new(),
                }
            })
            .collect();
        let ds = Dataset::new("D", "INC", 4, 0, points).unwrap();
        Experiment::from_datasets("EXP", vec![ds]).unwrap()
    }

    fn minimizer() -> GeneticMinimizer<LogPolynomial> {
        GeneticMinimizer::from_settings(&MinimizerSettings {
            degree: 1,
            initial: vec![5.0, 1.0],
            ..MinimizerSettings::default()
        })
        .unwrap()
    }

    #[test]
    fn chi2_never_increases_and_improves() {
        let exp = power_law_experiment();
        let subset = SubsetData::build(&exp, &exp.central_values(), &[0, 1, 2, 3]).unwrap();
        let ga = minimizer();
        let mut handle = ga.initialize(17).unwrap();
        let start = ga.evaluate(&handle, &subset);
        let mut last = start;
        for _ in 0..200 {
            handle = ga.step(handle, std::slice::from_ref(&subset)).unwrap();
            let now = ga.evaluate(&handle, &subset);
            assert!(now <= last + 1e-9);
            last = now;
        }
        assert!(last < start);
        assert_eq!(ga.snapshot(&handle).iteration, 200);
    }

    #[test]
    fn same_seed_same_trajectory() {
        let exp = power_law_experiment();
        let subset = SubsetData::build(&exp, &exp.central_values(), &[0, 1, 2, 3]).unwrap();
        let ga = minimizer();
        let run = || {
            let mut h = ga.initialize(5).unwrap();
            for _ in 0..20 {
                h = ga.step(h, std::slice::from_ref(&subset)).unwrap();
            }
            h.params
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn rejects_invalid_settings() {
        let bad = MinimizerSettings {
            mutants: 0,
            ..MinimizerSettings::default()
        };
        assert!(GeneticMinimizer::from_settings(&bad).is_err());
        let bad = MinimizerSettings {
            degree: 0,
            initial: vec![1.0, 2.0],
            ..MinimizerSettings::default()
        };
        assert!(bad.validate().is_err());
    }
}
