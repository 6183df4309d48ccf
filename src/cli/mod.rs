//! Command-line parsing for the replica fitter.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! filtering and fitting code. Anything given here overrides the runcard.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "nnfit", version, about = "Replica-based PDF fit: data filters and fit orchestration")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Read raw datasets, print a summary and optionally export commondata files.
    Filter(FilterArgs),
    /// Run the replica fit described by a runcard.
    Fit(FitArgs),
    /// Print the training/validation split of one replica without fitting.
    Split(SplitArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct FilterArgs {
    /// Dataset names (e.g. CMSTTBARTOT). Defaults to every dataset of the runcard, or the built-in catalog.
    pub datasets: Vec<String>,

    /// Root of the raw data tree (`<path>/rawdata/<name>/<name>.data`).
    #[arg(long)]
    pub data_path: Option<PathBuf>,

    /// Runcard providing extra dataset schemas and the dataset list.
    #[arg(long)]
    pub runcard: Option<PathBuf>,

    /// Write DATA_/SYSTYPE_ commondata files into this directory.
    #[arg(long)]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// JSON runcard.
    pub runcard: PathBuf,

    /// Number of replicas to fit.
    #[arg(short = 'n', long)]
    pub replicas: Option<usize>,

    /// Index of the first replica (1-based).
    #[arg(long)]
    pub first_replica: Option<usize>,

    /// Worker threads (default: one per core).
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,

    #[arg(long)]
    pub data_path: Option<PathBuf>,

    #[arg(long)]
    pub results_dir: Option<PathBuf>,

    /// Abort every replica still running after this many seconds.
    #[arg(long)]
    pub timeout: Option<f64>,
}

#[derive(Debug, Parser, Clone)]
pub struct SplitArgs {
    /// JSON runcard.
    pub runcard: PathBuf,

    /// Replica whose seeds drive the split.
    #[arg(short, long, default_value_t = 1)]
    pub replica: usize,

    #[arg(long)]
    pub data_path: Option<PathBuf>,
}
