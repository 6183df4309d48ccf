//! Grouping of filtered datasets into experiments.

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use nalgebra::{DMatrix, DVector};

use crate::domain::{Correlation, DataPoint, Dataset, SysKind};
use crate::error::AppError;
use crate::experiment::covariance::build_covariance;

/// One or more datasets fitted together, sharing a covariance matrix.
///
/// Points are the concatenation of the datasets' points, in dataset order and
/// then file order. Nothing here is mutable after construction.
#[derive(Debug, Clone)]
pub struct Experiment {
    name: String,
    datasets: Vec<Dataset>,
    covariance: DMatrix<f64>,
}

impl Experiment {
    pub fn from_datasets(name: impl Into<String>, datasets: Vec<Dataset>) -> Result<Self, AppError> {
        let name = name.into();
        if datasets.is_empty() {
            return Err(AppError::new(3, format!("Experiment {name} has no datasets.")));
        }
        check_alignment(&format!("Experiment {name}"), &datasets)?;

        let covariance = build_covariance(&datasets);
        Ok(Self {
            name,
            datasets,
            covariance,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn datasets(&self) -> &[Dataset] {
        &self.datasets
    }

    pub fn n_points(&self) -> usize {
        self.datasets.iter().map(Dataset::n_data).sum()
    }

    pub fn points(&self) -> impl Iterator<Item = &DataPoint> {
        self.datasets.iter().flat_map(|d| d.points().iter())
    }

    /// Index range of each dataset inside the concatenated point list.
    pub fn dataset_ranges(&self) -> Vec<Range<usize>> {
        let mut start = 0;
        self.datasets
            .iter()
            .map(|d| {
                let range = start..start + d.n_data();
                start = range.end;
                range
            })
            .collect()
    }

    pub fn central_values(&self) -> DVector<f64> {
        DVector::from_iterator(self.n_points(), self.points().map(|p| p.central))
    }

    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }
}

/// Every experiment of a fit and the covariance joining them.
///
/// Points are ordered experiment by experiment. A named systematic shared by
/// several experiments (a common luminosity) correlates their points here,
/// while each experiment's diagonal block equals its own covariance.
#[derive(Debug, Clone)]
pub struct ExperimentSet {
    experiments: Vec<Experiment>,
    covariance: DMatrix<f64>,
}

impl ExperimentSet {
    pub fn new(experiments: Vec<Experiment>) -> Result<Self, AppError> {
        if experiments.is_empty() {
            return Err(AppError::new(3, "No experiments to fit."));
        }
        let mut names = HashSet::new();
        for dataset in experiments.iter().flat_map(Experiment::datasets) {
            if !names.insert(dataset.name()) {
                return Err(AppError::new(
                    3,
                    format!("Dataset {} appears more than once in the fit.", dataset.name()),
                ));
            }
        }
        check_alignment("Fit", experiments.iter().flat_map(Experiment::datasets))?;

        let covariance = build_covariance(experiments.iter().flat_map(Experiment::datasets));
        Ok(Self {
            experiments,
            covariance,
        })
    }

    pub fn experiments(&self) -> &[Experiment] {
        &self.experiments
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Experiment> {
        self.experiments.iter()
    }

    pub fn n_points(&self) -> usize {
        self.experiments.iter().map(Experiment::n_points).sum()
    }

    pub fn points(&self) -> impl Iterator<Item = &DataPoint> {
        self.experiments.iter().flat_map(Experiment::points)
    }

    /// Index range of each experiment inside the global point list.
    pub fn ranges(&self) -> Vec<Range<usize>> {
        let mut start = 0;
        self.experiments
            .iter()
            .map(|e| {
                let range = start..start + e.n_points();
                start = range.end;
                range
            })
            .collect()
    }

    pub fn central_values(&self) -> DVector<f64> {
        DVector::from_iterator(self.n_points(), self.points().map(|p| p.central))
    }

    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }
}

/// A correlated systematic name must mean the same kind of source everywhere.
fn check_alignment<'a, I>(scope: &str, datasets: I) -> Result<(), AppError>
where
    I: IntoIterator<Item = &'a Dataset>,
{
    let mut seen: HashMap<&str, (SysKind, &str)> = HashMap::new();
    for dataset in datasets {
        for point in dataset.points() {
            for sys in &point.systematics {
                let Correlation::Named(name) = sys.correlation() else {
                    continue;
                };
                match seen.get(name) {
                    Some((kind, origin)) if *kind != sys.kind => {
                        return Err(AppError::new(
                            3,
                            format!(
                                "{scope}: systematic {name} is {} in {origin} but {} in {}.",
                                kind.label(),
                                sys.kind.label(),
                                dataset.name()
                            ),
                        ));
                    }
                    Some(_) => {}
                    None => {
                        seen.insert(name, (sys.kind, dataset.name()));
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Kinematics, SystematicUncertainty};

    fn dataset(name: &str, centrals: &[f64], sys: (&str, SysKind)) -> Dataset {
        let points = centrals
            .iter()
            .map(|&c| DataPoint {
                kinematics: Kinematics::default(),
                central: c,
                stat: 1.0,
                systematics: vec![SystematicUncertainty::from_absolute(sys.0, sys.1, 1.0, c)],
            })
            .collect::<Vec<_>>();
        Dataset::new(name, "INC", centrals.len(), 1, points).unwrap()
    }

    #[test]
    fn concatenates_in_source_order() {
        let exp = Experiment::from_datasets(
            "CMS",
            vec![
                dataset("A", &[1.0, 2.0], ("LUMI", SysKind::Mult)),
                dataset("B", &[3.0], ("LUMI", SysKind::Mult)),
            ],
        )
        .unwrap();
        assert_eq!(exp.n_points(), 3);
        let centrals: Vec<f64> = exp.points().map(|p| p.central).collect();
        assert_eq!(centrals, vec![1.0, 2.0, 3.0]);
        assert_eq!(exp.dataset_ranges(), vec![0..2, 2..3]);
        assert_eq!(exp.covariance().nrows(), 3);
        assert_eq!(exp.central_values().len(), 3);
    }

    #[test]
    fn mismatched_kind_for_shared_name_is_rejected() {
        let err = Experiment::from_datasets(
            "CMS",
            vec![
                dataset("A", &[1.0], ("LUMI", SysKind::Mult)),
                dataset("B", &[3.0], ("LUMI", SysKind::Add)),
            ],
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(err.message().contains("LUMI"));
    }

    #[test]
    fn empty_experiment_is_rejected() {
        assert!(Experiment::from_datasets("EMPTY", Vec::new()).is_err());
    }

    fn single(name: &str, dataset_name: &str, central: f64) -> Experiment {
        Experiment::from_datasets(name, vec![dataset(dataset_name, &[central], ("LUMI", SysKind::Mult))]).unwrap()
    }

    #[test]
    fn shared_name_correlates_experiments() {
        let set = ExperimentSet::new(vec![single("A", "DA", 10.0), single("B", "DB", 20.0)]).unwrap();
        assert_eq!(set.n_points(), 2);
        assert_eq!(set.ranges(), vec![0..1, 1..2]);
        // Unit absolute luminosity on both points, unit stat.
        assert_eq!(set.covariance()[(0, 1)], 1.0);
        assert_eq!(set.covariance()[(0, 0)], 2.0);
        assert_eq!(set.experiments()[0].covariance()[(0, 0)], 2.0);
    }

    #[test]
    fn set_rejects_repeated_datasets_and_kind_clashes() {
        let err = ExperimentSet::new(vec![single("A", "D", 1.0), single("B", "D", 2.0)]).unwrap_err();
        assert_eq!(err.exit_code(), 3);

        let clash = Experiment::from_datasets("B", vec![dataset("DB", &[2.0], ("LUMI", SysKind::Add))]).unwrap();
        let err = ExperimentSet::new(vec![single("A", "DA", 1.0), clash]).unwrap_err();
        assert!(err.message().starts_with("Fit: systematic LUMI"));

        assert!(ExperimentSet::new(Vec::new()).is_err());
    }
}
