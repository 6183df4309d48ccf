//! `nnfit` library crate.
//!
//! The binary (`nnfit`) is a thin wrapper around this library so that:
//!
//! - the filters and the fit state machine are testable without spawning processes
//! - the minimizer can be swapped through the `fit::Minimizer` trait
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod experiment;
pub mod fit;
pub mod io;
pub mod math;
pub mod report;
