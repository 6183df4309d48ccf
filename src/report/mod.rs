//! Reporting utilities: dataset summaries, splits and replica status.

pub mod format;

pub use format::*;

use crate::domain::FitStatus;
use crate::fit::ReplicaOutcome;

/// Aggregate view of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub n_end: usize,
    pub n_abrt: usize,
    /// Mean and standard deviation of the best validation chi²/N over END replicas.
    pub validation_mean: Option<f64>,
    pub validation_std: Option<f64>,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: &[ReplicaOutcome]) -> Self {
        let n_end = outcomes.iter().filter(|o| o.status == FitStatus::End).count();
        let n_abrt = outcomes.iter().filter(|o| o.status == FitStatus::Abrt).count();

        let values: Vec<f64> = outcomes
            .iter()
            .filter(|o| o.status == FitStatus::End)
            .filter_map(|o| o.best.as_ref())
            .map(|b| b.monitored())
            .filter(|v| v.is_finite())
            .collect();

        let (validation_mean, validation_std) = if values.is_empty() {
            (None, None)
        } else {
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            (Some(mean), Some(var.sqrt()))
        };

        Self {
            n_end,
            n_abrt,
            validation_mean,
            validation_std,
        }
    }

    /// At least one replica produced a usable fit.
    pub fn succeeded(&self) -> bool {
        self.n_end > 0
    }
}
