//! Experiments: aggregated datasets, their covariance, splits and replicas.

pub mod aggregate;
pub mod covariance;
pub mod pseudodata;
pub mod split;

pub use aggregate::*;
pub use covariance::*;
pub use pseudodata::*;
pub use split::*;
