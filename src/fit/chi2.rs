//! Chi-squared evaluation on training and validation subsets.

use nalgebra::{DMatrix, DVector};
use serde::Serialize;

use crate::domain::Kinematics;
use crate::error::AppError;
use crate::experiment::{Experiment, ExperimentSet, TrainValidSplit, sub_covariance};
use crate::io::results::TOTAL_ROW;
use crate::math::invert_spd;

/// Points selected by a split, with the inverse of their covariance block.
#[derive(Debug, Clone)]
pub struct SubsetData {
    /// Experiment name, or the total row label for the combined subset.
    pub experiment: String,
    pub indices: Vec<usize>,
    pub kinematics: Vec<Kinematics>,
    pub values: DVector<f64>,
    pub inv_cov: DMatrix<f64>,
}

impl SubsetData {
    /// `values` are the (possibly fluctuated) data for every point of `experiment`.
    pub fn build(experiment: &Experiment, values: &DVector<f64>, indices: &[usize]) -> Result<Self, AppError> {
        let kinematics: Vec<Kinematics> = experiment.points().map(|p| p.kinematics).collect();
        Self::select(experiment.name(), &kinematics, values, experiment.covariance(), indices)
    }

    /// Like `build`, with `indices` into the points of every experiment in
    /// `set` and the covariance block taken from the joint matrix.
    pub fn from_set(
        label: &str,
        set: &ExperimentSet,
        values: &DVector<f64>,
        indices: &[usize],
    ) -> Result<Self, AppError> {
        let kinematics: Vec<Kinematics> = set.points().map(|p| p.kinematics).collect();
        Self::select(label, &kinematics, values, set.covariance(), indices)
    }

    fn select(
        label: &str,
        kinematics: &[Kinematics],
        values: &DVector<f64>,
        covariance: &DMatrix<f64>,
        indices: &[usize],
    ) -> Result<Self, AppError> {
        let n = kinematics.len();
        if values.len() != n {
            return Err(AppError::new(
                4,
                format!("{label}: {} values for {n} points.", values.len()),
            ));
        }
        if let Some(bad) = indices.iter().find(|&&i| i >= n) {
            return Err(AppError::new(4, format!("{label}: point index {bad} out of range.")));
        }

        let cov = sub_covariance(covariance, indices);
        let inv_cov = invert_spd(&cov)
            .ok_or_else(|| AppError::new(4, format!("{label}: covariance subset is not invertible.")))?;

        Ok(Self {
            experiment: label.to_string(),
            indices: indices.to_vec(),
            kinematics: indices.iter().map(|&i| kinematics[i]).collect(),
            values: DVector::from_iterator(indices.len(), indices.iter().map(|&i| values[i])),
            inv_cov,
        })
    }

    pub fn ndata(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// `(d - t)ᵀ C⁻¹ (d - t)`; an empty subset contributes zero.
    pub fn chi2(&self, predictions: &DVector<f64>) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        if predictions.len() != self.ndata() {
            return f64::NAN;
        }
        let diff = &self.values - predictions;
        diff.dot(&(&self.inv_cov * &diff))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Chi2 {
    pub value: f64,
    pub ndata: usize,
}

impl Chi2 {
    pub fn per_point(&self) -> f64 {
        if self.ndata == 0 { 0.0 } else { self.value / self.ndata as f64 }
    }

    pub fn is_finite(&self) -> bool {
        self.value.is_finite()
    }

    fn combine(self, other: Chi2) -> Chi2 {
        Chi2 {
            value: self.value + other.value,
            ndata: self.ndata + other.ndata,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentChi2 {
    pub name: String,
    pub training: Chi2,
    pub validation: Chi2,
}

/// Chi-squared values of one iteration, per experiment and in total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationSummary {
    pub iteration: usize,
    pub experiments: Vec<ExperimentChi2>,
    pub training: Chi2,
    pub validation: Chi2,
}

impl IterationSummary {
    /// Totals as plain sums of the per-experiment values.
    pub fn new(iteration: usize, experiments: Vec<ExperimentChi2>) -> Self {
        let training = experiments.iter().fold(Chi2::default(), |acc, e| acc.combine(e.training));
        let validation = experiments.iter().fold(Chi2::default(), |acc, e| acc.combine(e.validation));
        Self::with_totals(iteration, experiments, training, validation)
    }

    pub fn with_totals(iteration: usize, experiments: Vec<ExperimentChi2>, training: Chi2, validation: Chi2) -> Self {
        Self {
            iteration,
            experiments,
            training,
            validation,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.training.is_finite() && self.validation.is_finite()
    }

    /// Validation chi²/N, or training when there are no validation points.
    pub fn monitored(&self) -> f64 {
        if self.validation.ndata > 0 {
            self.validation.per_point()
        } else {
            self.training.per_point()
        }
    }
}

/// Training and validation subsets of one replica.
///
/// Per-experiment subsets feed the chi² log. The totals hold every
/// experiment's points at once, so correlations between experiments enter
/// the fitted and monitored chi².
#[derive(Debug, Clone)]
pub struct ReplicaData {
    pub training: Vec<SubsetData>,
    pub validation: Vec<SubsetData>,
    pub training_total: SubsetData,
    pub validation_total: SubsetData,
}

impl ReplicaData {
    /// `values` cover every point of `set`; `splits` index each experiment's own points.
    pub fn build(set: &ExperimentSet, values: &DVector<f64>, splits: &[TrainValidSplit]) -> Result<Self, AppError> {
        if splits.len() != set.experiments().len() {
            return Err(AppError::new(4, "Replica data does not match the experiment list."));
        }
        let mut training = Vec::with_capacity(splits.len());
        let mut validation = Vec::with_capacity(splits.len());
        let mut all_train = Vec::new();
        let mut all_valid = Vec::new();

        for ((exp, range), split) in set.iter().zip(set.ranges()).zip(splits) {
            if !split.train.iter().chain(&split.valid).all(|&i| i < range.len()) {
                return Err(AppError::new(
                    4,
                    format!("Experiment {}: split index out of range.", exp.name()),
                ));
            }
            let train: Vec<usize> = split.train.iter().map(|&i| range.start + i).collect();
            let valid: Vec<usize> = split.valid.iter().map(|&i| range.start + i).collect();
            training.push(SubsetData::from_set(exp.name(), set, values, &train)?);
            validation.push(SubsetData::from_set(exp.name(), set, values, &valid)?);
            all_train.extend(train);
            all_valid.extend(valid);
        }

        Ok(Self {
            training,
            validation,
            training_total: SubsetData::from_set(TOTAL_ROW, set, values, &all_train)?,
            validation_total: SubsetData::from_set(TOTAL_ROW, set, values, &all_valid)?,
        })
    }

    /// Evaluate every subset with `eval` and collect the iteration summary.
    pub fn summarize<F>(&self, iteration: usize, eval: F) -> IterationSummary
    where
        F: Fn(&SubsetData) -> f64,
    {
        let chi2 = |subset: &SubsetData| Chi2 {
            value: eval(subset),
            ndata: subset.ndata(),
        };
        let experiments = self
            .training
            .iter()
            .zip(&self.validation)
            .map(|(tr, vl)| ExperimentChi2 {
                name: tr.experiment.clone(),
                training: chi2(tr),
                validation: chi2(vl),
            })
            .collect();
        IterationSummary::with_totals(
            iteration,
            experiments,
            chi2(&self.training_total),
            chi2(&self.validation_total),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DataPoint, Dataset, SysKind, SystematicUncertainty};

    fn experiment() -> Experiment {
        let points = [10.0, 20.0, 30.0]
            .iter()
            .map(|&c| DataPoint {
                kinematics: Kinematics { k1: 0.0, k2: 0.0, k3: c },
                central: c,
                stat: 2.0,
                systematics: Vec::new(),
            })
            .collect();
        let ds = Dataset::new("D", "INC", 3, 0, points).unwrap();
        Experiment::from_datasets("EXP", vec![ds]).unwrap()
    }

    #[test]
    fn diagonal_chi2() {
        let exp = experiment();
        let subset = SubsetData::build(&exp, &exp.central_values(), &[0, 2]).unwrap();
        assert_eq!(subset.kinematics[1].k3, 30.0);
        let pred = DVector::from_vec(vec![12.0, 30.0]);
        // (2/2)^2 + 0
        assert!((subset.chi2(&pred) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn empty_subset_contributes_zero() {
        let exp = experiment();
        let subset = SubsetData::build(&exp, &exp.central_values(), &[]).unwrap();
        assert_eq!(subset.chi2(&DVector::zeros(0)), 0.0);
        assert_eq!(Chi2 { value: 0.0, ndata: 0 }.per_point(), 0.0);
    }

    #[test]
    fn summary_totals_and_monitoring() {
        let set = ExperimentSet::new(vec![experiment()]).unwrap();
        let split = TrainValidSplit {
            train: vec![0, 1, 2],
            valid: Vec::new(),
        };
        let data = ReplicaData::build(&set, &set.central_values(), &[split]).unwrap();
        let summary = data.summarize(5, |s| s.ndata() as f64 * 2.0);
        assert_eq!(summary.iteration, 5);
        assert_eq!(summary.training.ndata, 3);
        assert_eq!(summary.validation.ndata, 0);
        // No validation points: training chi²/N is monitored.
        assert_eq!(summary.monitored(), 2.0);
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let exp = experiment();
        assert!(SubsetData::build(&exp, &exp.central_values(), &[3]).is_err());
    }

    fn lumi_experiment(name: &str, dataset: &str, central: f64) -> Experiment {
        let point = DataPoint {
            kinematics: Kinematics { k1: 0.0, k2: 0.0, k3: central },
            central,
            stat: 1.0,
            systematics: vec![SystematicUncertainty::from_absolute("CMSLUMI13", SysKind::Mult, 2.0, central)],
        };
        let ds = Dataset::new(dataset, "INC", 1, 1, vec![point]).unwrap();
        Experiment::from_datasets(name, vec![ds]).unwrap()
    }

    #[test]
    fn totals_see_correlations_between_experiments() {
        let set = ExperimentSet::new(vec![lumi_experiment("A", "DA", 10.0), lumi_experiment("B", "DB", 20.0)]).unwrap();
        let splits = [
            TrainValidSplit { train: vec![0], valid: Vec::new() },
            TrainValidSplit { train: vec![0], valid: Vec::new() },
        ];
        let data = ReplicaData::build(&set, &set.central_values(), &splits).unwrap();
        assert_eq!(data.training_total.indices, vec![0, 1]);
        assert_eq!(data.training[1].indices, vec![1]);
        assert_eq!(data.training_total.experiment, TOTAL_ROW);

        // C = [[5, 4], [4, 5]]; a common shift of +1 costs 2/9, not 2/5.
        let shifted = DVector::from_vec(vec![11.0, 21.0]);
        let total = data.training_total.chi2(&shifted);
        assert!((total - 2.0 / 9.0).abs() < 1e-12);
        let summed: f64 = data.training.iter().map(|s| s.chi2(&DVector::from_vec(vec![s.values[0] + 1.0]))).sum();
        assert!((summed - 2.0 / 5.0).abs() < 1e-12);

        let summary = data.summarize(1, |s| s.chi2(&s.values.add_scalar(1.0)));
        assert!((summary.training.value - 2.0 / 9.0).abs() < 1e-12);
        assert_eq!(summary.experiments.len(), 2);
    }

    #[test]
    fn split_index_past_its_experiment_is_rejected() {
        let set = ExperimentSet::new(vec![lumi_experiment("A", "DA", 10.0), lumi_experiment("B", "DB", 20.0)]).unwrap();
        let splits = [
            TrainValidSplit { train: vec![1], valid: Vec::new() },
            TrainValidSplit::default(),
        ];
        assert!(ReplicaData::build(&set, &set.central_values(), &splits).is_err());
    }
}
