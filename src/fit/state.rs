//! Per-replica fit state and its legal transitions.
//!
//! ```text
//! INIT ──► ITER ──► END
//!   │       │ ▲
//!   │       └─┘
//!   └──────►┴──► ABRT
//! ```
//!
//! `INIT` is only ever entered by construction; `END` and `ABRT` are final.

use std::path::PathBuf;

use nalgebra::DVector;

use crate::domain::FitStatus;
use crate::error::AppError;
use crate::experiment::TrainValidSplit;
use crate::fit::seeds::ReplicaSeeds;

#[derive(Debug, Clone)]
pub struct ReplicaState {
    pub replica: usize,
    pub folder: PathBuf,
    pub seeds: ReplicaSeeds,
    /// Data values of every experiment (central values or a fluctuated replica).
    pub pseudodata: DVector<f64>,
    pub splits: Vec<TrainValidSplit>,
    pub iteration: usize,
    status: FitStatus,
    reason: Option<String>,
}

impl ReplicaState {
    pub fn new(replica: usize, folder: PathBuf, seeds: ReplicaSeeds) -> Self {
        Self {
            replica,
            folder,
            seeds,
            pseudodata: DVector::zeros(0),
            splits: Vec::new(),
            iteration: 0,
            status: FitStatus::Init,
            reason: None,
        }
    }

    pub fn status(&self) -> FitStatus {
        self.status
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn transition(&mut self, next: FitStatus) -> Result<(), AppError> {
        use FitStatus::*;
        let allowed = matches!(
            (self.status, next),
            (Init, Iter) | (Init, Abrt) | (Iter, Iter) | (Iter, End) | (Iter, Abrt)
        );
        if !allowed {
            return Err(AppError::new(
                4,
                format!("Replica {}: illegal transition {} -> {next}.", self.replica, self.status),
            ));
        }
        self.status = next;
        Ok(())
    }

    /// Move to `ABRT` from any non-final state, recording why.
    pub fn abort(&mut self, reason: impl Into<String>) -> Result<(), AppError> {
        self.transition(FitStatus::Abrt)?;
        self.reason = Some(reason.into());
        Ok(())
    }

    /// Move to `END`, recording the stopping reason.
    pub fn finish(&mut self, reason: impl Into<String>) -> Result<(), AppError> {
        self.transition(FitStatus::End)?;
        self.reason = Some(reason.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ReplicaState {
        ReplicaState::new(
            1,
            PathBuf::from("replica_1"),
            ReplicaSeeds {
                trvl: 1,
                nn: 2,
                mc: None,
            },
        )
    }

    #[test]
    fn normal_lifecycle() {
        let mut s = state();
        assert_eq!(s.status(), FitStatus::Init);
        s.transition(FitStatus::Iter).unwrap();
        s.transition(FitStatus::Iter).unwrap();
        s.finish("done").unwrap();
        assert_eq!(s.status(), FitStatus::End);
        assert_eq!(s.reason(), Some("done"));
    }

    #[test]
    fn final_states_are_final() {
        let mut s = state();
        s.transition(FitStatus::Iter).unwrap();
        s.abort("nan").unwrap();
        assert!(s.transition(FitStatus::Iter).is_err());
        assert!(s.transition(FitStatus::End).is_err());
        assert!(s.abort("again").is_err());
        assert_eq!(s.reason(), Some("nan"));
    }

    #[test]
    fn init_cannot_be_reentered_or_skip_to_end() {
        let mut s = state();
        assert!(s.transition(FitStatus::Init).is_err());
        assert!(s.transition(FitStatus::End).is_err());
        s.abort("setup failed").unwrap();
        assert_eq!(s.status(), FitStatus::Abrt);

        let mut s = state();
        s.transition(FitStatus::Iter).unwrap();
        assert!(s.transition(FitStatus::Init).is_err());
    }
}
