//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - built once by the dataset filters and shared read-only across replicas
//! - exported to commondata files and replica logs
//! - compared bit-for-bit in tests (filters are deterministic)

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Systematic category: uncorrelated across data points (diagonal only).
pub const UNCORR: &str = "UNCORR";
/// Systematic category: correlated across the points of its own dataset.
pub const CORR: &str = "CORR";
/// Theory uncertainty, uncorrelated.
pub const THEORYUNCORR: &str = "THEORYUNCORR";
/// Theory uncertainty, correlated within its dataset.
pub const THEORYCORR: &str = "THEORYCORR";
/// Systematic ignored when building the covariance matrix.
pub const SKIP: &str = "SKIP";

/// How a systematic uncertainty scales with the central value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SysKind {
    /// The percentage (`mult`) is the primary representation.
    Mult,
    /// The absolute value (`add`) is the primary representation.
    Add,
}

impl SysKind {
    pub fn label(self) -> &'static str {
        match self {
            SysKind::Mult => "MULT",
            SysKind::Add => "ADD",
        }
    }
}

/// How a systematic takes part in the covariance matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correlation<'a> {
    /// Diagonal contribution only.
    Uncorrelated,
    /// Correlated across the points of the dataset it belongs to.
    IntraDataset,
    /// Correlated with every systematic carrying the same name, in any dataset.
    Named(&'a str),
    /// Not part of the covariance matrix.
    Skipped,
}

/// A named systematic uncertainty attached to one data point.
///
/// `mult` is a percentage of the central value and `add` the absolute size.
/// Both are kept consistent: `add == mult * central / 100`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystematicUncertainty {
    pub name: String,
    pub kind: SysKind,
    pub mult: f64,
    pub add: f64,
}

impl SystematicUncertainty {
    /// Multiplicative systematic from a percentage.
    pub fn multiplicative(name: impl Into<String>, mult_pct: f64, central: f64) -> Self {
        Self {
            name: name.into(),
            kind: SysKind::Mult,
            mult: mult_pct,
            add: mult_pct * central / 100.0,
        }
    }

    /// Systematic of the given kind from an absolute value.
    ///
    /// The percentage is derived from `central`, which must be non-zero.
    pub fn from_absolute(name: impl Into<String>, kind: SysKind, add: f64, central: f64) -> Self {
        Self {
            name: name.into(),
            kind,
            mult: add / central * 100.0,
            add,
        }
    }

    /// Re-derive the secondary representation after the central value moved.
    pub fn rescale(&mut self, central: f64) {
        match self.kind {
            SysKind::Mult => self.add = self.mult * central / 100.0,
            SysKind::Add => self.mult = self.add / central * 100.0,
        }
    }

    pub fn correlation(&self) -> Correlation<'_> {
        match self.name.as_str() {
            UNCORR | THEORYUNCORR => Correlation::Uncorrelated,
            CORR | THEORYCORR => Correlation::IntraDataset,
            SKIP => Correlation::Skipped,
            other => Correlation::Named(other),
        }
    }
}

/// Kinematic coordinates of a data point.
///
/// For total top-pair cross sections: `k1` = rapidity (0), `k2` = m_t², `k3` = √s in GeV.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Kinematics {
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
}

/// A normalized experimental data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub kinematics: Kinematics,
    /// Central value, already shifted by any asymmetric-error symmetrization.
    pub central: f64,
    pub stat: f64,
    /// Systematics in source column order.
    pub systematics: Vec<SystematicUncertainty>,
}

impl DataPoint {
    /// Shift the central value by `delta_pct` percent and keep every systematic consistent.
    pub fn apply_shift(&mut self, delta_pct: f64) {
        if delta_pct == 0.0 {
            return;
        }
        self.central *= 1.0 + delta_pct * 0.01;
        for sys in &mut self.systematics {
            sys.rescale(self.central);
        }
    }
}

/// A filtered dataset. Built once by a filter pass and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    name: String,
    process: String,
    n_sys: usize,
    points: Vec<DataPoint>,
}

impl Dataset {
    /// Assemble a dataset, checking the declared point and systematic counts.
    pub fn new(
        name: impl Into<String>,
        process: impl Into<String>,
        n_data: usize,
        n_sys: usize,
        points: Vec<DataPoint>,
    ) -> Result<Self, AppError> {
        let name = name.into();
        if points.len() != n_data {
            return Err(AppError::new(
                3,
                format!("Dataset {name}: expected {n_data} points, got {}.", points.len()),
            ));
        }
        if let Some((i, p)) = points.iter().enumerate().find(|(_, p)| p.systematics.len() != n_sys) {
            return Err(AppError::new(
                3,
                format!(
                    "Dataset {name}: point {} has {} systematics, expected {n_sys}.",
                    i + 1,
                    p.systematics.len()
                ),
            ));
        }
        Ok(Self {
            name,
            process: process.into(),
            n_sys,
            points,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn process(&self) -> &str {
        &self.process
    }

    pub fn n_data(&self) -> usize {
        self.points.len()
    }

    pub fn n_sys(&self) -> usize {
        self.n_sys
    }

    pub fn points(&self) -> &[DataPoint] {
        &self.points
    }
}

/// Lifecycle of a fit replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FitStatus {
    Init,
    Iter,
    End,
    Abrt,
}

impl FitStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, FitStatus::End | FitStatus::Abrt)
    }

    pub fn label(self) -> &'static str {
        match self {
            FitStatus::Init => "INIT",
            FitStatus::Iter => "ITER",
            FitStatus::End => "END",
            FitStatus::Abrt => "ABRT",
        }
    }
}

impl fmt::Display for FitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(central: f64) -> DataPoint {
        DataPoint {
            kinematics: Kinematics::default(),
            central,
            stat: 1.0,
            systematics: vec![
                SystematicUncertainty::multiplicative(UNCORR, 5.0, central),
                SystematicUncertainty::from_absolute("CMSLUMI13", SysKind::Add, 2.0, central),
            ],
        }
    }

    #[test]
    fn multiplicative_add_matches_percentage() {
        let sys = SystematicUncertainty::multiplicative(UNCORR, 4.0, 250.0);
        assert!((sys.add - 10.0).abs() < 1e-12);
    }

    #[test]
    fn shift_keeps_representations_consistent() {
        let mut p = point(200.0);
        p.apply_shift(10.0);
        assert!((p.central - 220.0).abs() < 1e-9);

        let mult = &p.systematics[0];
        assert!((mult.mult - 5.0).abs() < 1e-12);
        assert!((mult.add - mult.mult * p.central / 100.0).abs() < 1e-9);

        let add = &p.systematics[1];
        assert!((add.add - 2.0).abs() < 1e-12);
        assert!((add.mult - add.add / p.central * 100.0).abs() < 1e-9);
    }

    #[test]
    fn zero_shift_leaves_point_untouched() {
        let mut p = point(792.0);
        let before = p.clone();
        p.apply_shift(0.0);
        assert_eq!(p, before);
    }

    #[test]
    fn correlation_categories() {
        let named = SystematicUncertainty::multiplicative("CMSLUMI13", 1.0, 1.0);
        assert_eq!(named.correlation(), Correlation::Named("CMSLUMI13"));
        let unc = SystematicUncertainty::multiplicative(UNCORR, 1.0, 1.0);
        assert_eq!(unc.correlation(), Correlation::Uncorrelated);
        let corr = SystematicUncertainty::multiplicative(CORR, 1.0, 1.0);
        assert_eq!(corr.correlation(), Correlation::IntraDataset);
        let skip = SystematicUncertainty::multiplicative(SKIP, 1.0, 1.0);
        assert_eq!(skip.correlation(), Correlation::Skipped);
    }

    #[test]
    fn dataset_rejects_wrong_counts() {
        assert!(Dataset::new("X", "INC", 2, 2, vec![point(1.0)]).is_err());
        assert!(Dataset::new("X", "INC", 1, 1, vec![point(1.0)]).is_err());
        let ds = Dataset::new("X", "INC", 1, 2, vec![point(1.0)]).unwrap();
        assert_eq!(ds.n_data(), 1);
        assert_eq!(ds.n_sys(), 2);
    }

    #[test]
    fn terminal_states() {
        assert!(FitStatus::End.is_terminal());
        assert!(FitStatus::Abrt.is_terminal());
        assert!(!FitStatus::Init.is_terminal());
        assert!(!FitStatus::Iter.is_terminal());
        assert_eq!(FitStatus::Abrt.to_string(), "ABRT");
    }
}
