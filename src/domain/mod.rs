//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - systematic uncertainties and their correlation categories
//! - normalized data points and datasets
//! - the replica fit status

pub mod types;

pub use types::*;
