//! Replica fit orchestration.
//!
//! Responsibilities:
//!
//! - derive per-replica seeds
//! - evaluate chi² on training/validation subsets
//! - drive the minimizer through the replica state machine
//! - decide when to stop
//! - run replicas in parallel

pub mod chi2;
pub mod engine;
pub mod model;
pub mod replica;
pub mod runner;
pub mod seeds;
pub mod state;
pub mod stopping;

pub use chi2::*;
pub use engine::*;
pub use model::*;
pub use replica::*;
pub use runner::*;
pub use seeds::*;
pub use state::*;
pub use stopping::*;
