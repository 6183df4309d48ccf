//! Mathematical utilities: covariance factorization, inversion and seed hashing.

pub mod hash;
pub mod linalg;

pub use hash::*;
pub use linalg::*;
