//! Stopping criteria for a replica fit.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::FitStatus;
use crate::error::AppError;
use crate::fit::chi2::IterationSummary;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoppingSettings {
    pub max_iterations: usize,
    /// Stop once the training chi²/N drops below this value.
    pub target_chi2: Option<f64>,
    /// Stop after this many iterations without a validation improvement.
    pub patience: Option<usize>,
    /// Abort when the training chi²/N exceeds this value.
    pub abort_chi2: f64,
    /// Wall-time budget per replica.
    pub max_seconds: Option<f64>,
}

impl Default for StoppingSettings {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            target_chi2: None,
            patience: None,
            abort_chi2: 1.0e6,
            max_seconds: None,
        }
    }
}

impl StoppingSettings {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_iterations == 0 {
            return Err(AppError::new(2, "max_iterations must be > 0."));
        }
        if !(self.abort_chi2.is_finite() && self.abort_chi2 > 0.0) {
            return Err(AppError::new(2, "abort_chi2 must be positive."));
        }
        if matches!(self.target_chi2, Some(t) if !(t.is_finite() && t > 0.0)) {
            return Err(AppError::new(2, "target_chi2 must be positive."));
        }
        if matches!(self.max_seconds, Some(s) if !(s.is_finite() && s > 0.0)) {
            return Err(AppError::new(2, "max_seconds must be positive."));
        }
        if self.patience == Some(0) {
            return Err(AppError::new(2, "patience must be > 0."));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StopDecision {
    Continue,
    Converged,
    Stalled,
    MaxIterations,
    Diverged(String),
    Cancelled(String),
}

impl StopDecision {
    /// Final status implied by the decision, or `None` to keep iterating.
    pub fn terminal_status(&self) -> Option<FitStatus> {
        match self {
            StopDecision::Continue => None,
            StopDecision::Converged | StopDecision::Stalled | StopDecision::MaxIterations => Some(FitStatus::End),
            StopDecision::Diverged(_) | StopDecision::Cancelled(_) => Some(FitStatus::Abrt),
        }
    }

    pub fn reason(&self) -> String {
        match self {
            StopDecision::Continue => "running".to_string(),
            StopDecision::Converged => "target chi2 reached".to_string(),
            StopDecision::Stalled => "validation chi2 stopped improving".to_string(),
            StopDecision::MaxIterations => "maximum number of iterations".to_string(),
            StopDecision::Diverged(why) | StopDecision::Cancelled(why) => why.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub decision: StopDecision,
    /// The monitored chi² improved on this iteration.
    pub improved: bool,
}

/// Tracks the best monitored chi² across iterations.
#[derive(Debug, Clone)]
pub struct StoppingTracker {
    settings: StoppingSettings,
    best: f64,
    best_iteration: usize,
}

impl StoppingTracker {
    pub fn new(settings: &StoppingSettings) -> Self {
        Self {
            settings: settings.clone(),
            best: f64::INFINITY,
            best_iteration: 0,
        }
    }

    pub fn best_iteration(&self) -> usize {
        self.best_iteration
    }

    pub fn observe(&mut self, summary: &IterationSummary, elapsed: Duration, cancelled: bool) -> Observation {
        let mut improved = false;

        if !summary.is_finite() {
            return Observation {
                decision: StopDecision::Diverged(format!(
                    "non-finite chi2 at iteration {}",
                    summary.iteration
                )),
                improved,
            };
        }

        let monitored = summary.monitored();
        if monitored < self.best {
            self.best = monitored;
            self.best_iteration = summary.iteration;
            improved = true;
        }

        let training = summary.training.per_point();
        let decision = if cancelled {
            StopDecision::Cancelled("cancelled".to_string())
        } else if training > self.settings.abort_chi2 {
            StopDecision::Diverged(format!(
                "training chi2/N {training:.4e} above abort threshold {:.4e}",
                self.settings.abort_chi2
            ))
        } else if matches!(self.settings.max_seconds, Some(s) if elapsed.as_secs_f64() > s) {
            StopDecision::Cancelled(format!("wall-time budget exceeded after {:.1}s", elapsed.as_secs_f64()))
        } else if matches!(self.settings.target_chi2, Some(t) if summary.training.ndata > 0 && training < t) {
            StopDecision::Converged
        } else if matches!(self.settings.patience, Some(p) if summary.iteration - self.best_iteration >= p) {
            StopDecision::Stalled
        } else if summary.iteration >= self.settings.max_iterations {
            StopDecision::MaxIterations
        } else {
            StopDecision::Continue
        };

        Observation { decision, improved }
    }
}
