//! Declarative per-dataset schemas.
//!
//! A schema describes everything the filter needs to turn a raw table into a
//! `Dataset`: the column layout of each line, how kinematics are derived, and
//! which name/kind every systematic column receives. Schemas deserialize from
//! the runcard, so new datasets need no new code.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::SysKind;
use crate::error::AppError;

/// Unit of an energy column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyUnit {
    Tev,
    Gev,
}

impl EnergyUnit {
    pub fn to_gev(self) -> f64 {
        match self {
            EnergyUnit::Tev => 1000.0,
            EnergyUnit::Gev => 1.0,
        }
    }
}

/// Unit of a symmetric systematic column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SysUnit {
    /// Same units as the central value.
    Absolute,
    /// Percent of the central value.
    Percent,
}

/// One entry of a line layout, in file order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "column", rename_all = "snake_case")]
pub enum Column {
    /// Ordinal index (validated as a number, otherwise ignored).
    Index,
    /// Center-of-mass energy.
    Energy { unit: EnergyUnit },
    Central,
    Stat,
    /// Two absolute columns `high low`, symmetrized into one multiplicative systematic.
    AsymmetricSys { name: String },
    /// One symmetric systematic column.
    Sys {
        name: String,
        unit: SysUnit,
        kind: SysKind,
    },
    Kin1,
    Kin2,
    Kin3,
    /// Column present in the file but unused.
    Skip,
}

impl Column {
    /// Number of whitespace-separated tokens the column consumes.
    pub fn width(&self) -> usize {
        match self {
            Column::AsymmetricSys { .. } => 2,
            _ => 1,
        }
    }

    pub fn is_systematic(&self) -> bool {
        matches!(self, Column::AsymmetricSys { .. } | Column::Sys { .. })
    }

    pub fn label(&self) -> String {
        match self {
            Column::Index => "index".to_string(),
            Column::Energy { .. } => "energy".to_string(),
            Column::Central => "central value".to_string(),
            Column::Stat => "statistical uncertainty".to_string(),
            Column::AsymmetricSys { name } => format!("asymmetric systematic {name}"),
            Column::Sys { name, .. } => format!("systematic {name}"),
            Column::Kin1 => "kin1".to_string(),
            Column::Kin2 => "kin2".to_string(),
            Column::Kin3 => "kin3".to_string(),
            Column::Skip => "skipped column".to_string(),
        }
    }
}

/// How the three kinematic coordinates of a point are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum KinematicRule {
    /// Total heavy-pair cross section: `(0, m², √s [GeV])` from the energy column.
    TopPair { top_mass: f64 },
    /// Read `kin1`/`kin2`/`kin3` columns directly (missing ones are zero).
    Columns,
}

/// Full description of one raw dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetSchema {
    pub name: String,
    /// Process type label (exported in commondata files).
    pub process: String,
    pub n_data: usize,
    pub kinematics: KinematicRule,
    pub columns: Vec<Column>,
}

impl DatasetSchema {
    /// Number of systematics each point carries.
    pub fn n_sys(&self) -> usize {
        self.columns.iter().filter(|c| c.is_systematic()).count()
    }

    /// Number of tokens expected on every line.
    pub fn n_tokens(&self) -> usize {
        self.columns.iter().map(Column::width).sum()
    }

    /// `<data_path>/rawdata/<name>/<name>.data`
    pub fn data_file(&self, data_path: &Path) -> PathBuf {
        data_path
            .join("rawdata")
            .join(&self.name)
            .join(format!("{}.data", self.name))
    }

    /// Check the layout is usable before touching any file.
    pub fn validate(&self) -> Result<(), AppError> {
        let invalid = |msg: String| AppError::new(2, format!("Invalid schema for {}: {msg}", self.name));

        if self.name.is_empty()
            || self
                .name
                .chars()
                .any(|c| c == '/' || c == '\\' || c.is_whitespace())
            || self.name == "."
            || self.name == ".."
        {
            return Err(AppError::new(
                2,
                format!("Invalid dataset name '{}'.", self.name),
            ));
        }
        if self.n_data == 0 {
            return Err(invalid("n_data must be > 0".to_string()));
        }

        let count = |pred: fn(&Column) -> bool| self.columns.iter().filter(|c| pred(c)).count();
        if count(|c| matches!(c, Column::Central)) != 1 {
            return Err(invalid("exactly one central value column is required".to_string()));
        }
        if count(|c| matches!(c, Column::Stat)) != 1 {
            return Err(invalid("exactly one statistical uncertainty column is required".to_string()));
        }
        for (label, n) in [
            ("energy", count(|c| matches!(c, Column::Energy { .. }))),
            ("kin1", count(|c| matches!(c, Column::Kin1))),
            ("kin2", count(|c| matches!(c, Column::Kin2))),
            ("kin3", count(|c| matches!(c, Column::Kin3))),
        ] {
            if n > 1 {
                return Err(invalid(format!("more than one {label} column")));
            }
        }

        match self.kinematics {
            KinematicRule::TopPair { top_mass } => {
                if !(top_mass.is_finite() && top_mass > 0.0) {
                    return Err(invalid(format!("top mass must be finite and > 0, got {top_mass}")));
                }
                if count(|c| matches!(c, Column::Energy { .. })) != 1 {
                    return Err(invalid("top_pair kinematics need an energy column".to_string()));
                }
            }
            KinematicRule::Columns => {}
        }

        for col in &self.columns {
            match col {
                Column::AsymmetricSys { name } | Column::Sys { name, .. } if name.trim().is_empty() => {
                    return Err(invalid("systematic columns need a non-empty name".to_string()));
                }
                _ => {}
            }
        }

        Ok(())
    }
}
