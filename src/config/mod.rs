//! Fit configuration.
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. the JSON runcard (`FitSettings::from_file`)
//! 2. environment defaults for paths (`NNPDF_DATA_PATH`, `NNPDF_RESULTS_PATH`),
//!    optionally loaded from a `.env` file
//! 3. command-line overrides applied by `app`

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::DatasetSchema;
use crate::error::AppError;
use crate::fit::engine::MinimizerSettings;
use crate::fit::seeds::SeedSettings;
use crate::fit::stopping::StoppingSettings;

pub const DATA_PATH_ENV: &str = "NNPDF_DATA_PATH";
pub const RESULTS_PATH_ENV: &str = "NNPDF_RESULTS_PATH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetSpec {
    pub name: String,
    /// Training fraction for this dataset; falls back to `FitSettings::frac`.
    #[serde(default)]
    pub frac: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentSpec {
    pub name: String,
    pub datasets: Vec<DatasetSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FitSettings {
    pub fit_name: String,
    #[serde(default)]
    pub data_path: Option<PathBuf>,
    #[serde(default)]
    pub results_dir: Option<PathBuf>,
    pub experiments: Vec<ExperimentSpec>,
    /// Extra dataset layouts, added to (or replacing) the built-in catalog.
    #[serde(default)]
    pub schemas: Vec<DatasetSchema>,
    #[serde(default = "default_one")]
    pub replicas: usize,
    #[serde(default = "default_one")]
    pub first_replica: usize,
    #[serde(default)]
    pub seeds: SeedSettings,
    /// Fit fluctuated pseudo-data instead of the central values.
    #[serde(default = "default_true")]
    pub genrep: bool,
    /// Default training fraction.
    #[serde(default = "default_frac")]
    pub frac: f64,
    #[serde(default)]
    pub stopping: StoppingSettings,
    #[serde(default)]
    pub minimizer: MinimizerSettings,
    #[serde(default)]
    pub threads: Option<usize>,
    /// Every iteration is logged by default; N > 1 keeps only every N-th
    /// plus the final one.
    #[serde(default = "default_one")]
    pub log_frequency: usize,
}

fn default_one() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_frac() -> f64 {
    0.5
}

impl FitSettings {
    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path)
            .map_err(|e| AppError::new(2, format!("Failed to open runcard '{}': {e}", path.display())))?;
        let settings: Self = serde_json::from_reader(file)
            .map_err(|e| AppError::new(2, format!("Invalid runcard '{}': {e}", path.display())))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.fit_name.trim().is_empty() || self.fit_name.contains(['/', '\\']) {
            return Err(AppError::new(2, format!("Invalid fit name '{}'.", self.fit_name)));
        }
        if self.experiments.is_empty() {
            return Err(AppError::new(2, "Runcard lists no experiments."));
        }
        for exp in &self.experiments {
            if exp.datasets.is_empty() {
                return Err(AppError::new(2, format!("Experiment {} lists no datasets.", exp.name)));
            }
        }
        if self.replicas == 0 {
            return Err(AppError::new(2, "Number of replicas must be > 0."));
        }
        if self.first_replica == 0 {
            return Err(AppError::new(2, "Replica numbering starts at 1."));
        }
        if self.log_frequency == 0 {
            return Err(AppError::new(2, "log_frequency must be > 0."));
        }
        if self.threads == Some(0) {
            return Err(AppError::new(2, "threads must be > 0."));
        }
        let fracs = std::iter::once(self.frac)
            .chain(self.experiments.iter().flat_map(|e| e.datasets.iter().filter_map(|d| d.frac)));
        for frac in fracs {
            if !(frac.is_finite() && (0.0..=1.0).contains(&frac)) {
                return Err(AppError::new(2, format!("Training fraction {frac} is outside [0, 1].")));
            }
        }
        self.stopping.validate()?;
        self.minimizer.validate()?;
        Ok(())
    }

    /// Fill unset paths from the environment (and a `.env` file, if present).
    pub fn apply_env(&mut self) {
        let _ = dotenvy::dotenv();
        if self.data_path.is_none() {
            self.data_path = std::env::var_os(DATA_PATH_ENV).map(PathBuf::from);
        }
        if self.results_dir.is_none() {
            self.results_dir = std::env::var_os(RESULTS_PATH_ENV).map(PathBuf::from);
        }
    }

    pub fn data_path(&self) -> Result<&Path, AppError> {
        self.data_path.as_deref().ok_or_else(|| {
            AppError::new(
                2,
                format!("No data path: set it in the runcard, with --data-path or {DATA_PATH_ENV}."),
            )
        })
    }

    pub fn results_dir(&self) -> Result<&Path, AppError> {
        self.results_dir.as_deref().ok_or_else(|| {
            AppError::new(
                2,
                format!("No results directory: set it in the runcard, with --results-dir or {RESULTS_PATH_ENV}."),
            )
        })
    }

    /// Replica numbers handled by this run (1-based).
    pub fn replica_indices(&self) -> Vec<usize> {
        (self.first_replica..self.first_replica + self.replicas).collect()
    }

    /// Training fractions of an experiment's datasets, in runcard order.
    pub fn fractions(&self, experiment: &ExperimentSpec) -> Vec<f64> {
        experiment.datasets.iter().map(|d| d.frac.unwrap_or(self.frac)).collect()
    }
}
