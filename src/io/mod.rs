//! File formats written and read by the pipeline.
//!
//! - commondata export of filtered datasets (`commondata`)
//! - per-replica logs and fitinfo records (`results`)

pub mod commondata;
pub mod results;

pub use commondata::*;
pub use results::*;
