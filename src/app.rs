//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and sets up logging
//! - loads the runcard and applies overrides
//! - filters datasets or runs the replica fit
//! - prints reports and picks the exit status

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use clap::Parser;

use crate::cli::{Cli, Command, FilterArgs, FitArgs, SplitArgs};
use crate::config::FitSettings;
use crate::data::SchemaCatalog;
use crate::error::AppError;
use crate::fit::CancelToken;
use crate::io::write_commondata;

pub mod pipeline;

/// Entry point for the `nnfit` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Filter(args) => handle_filter(args),
        Command::Fit(args) => handle_fit(args),
        Command::Split(args) => handle_split(args),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).try_init();
}

fn load_settings(runcard: &Path, data_path: Option<PathBuf>) -> Result<FitSettings, AppError> {
    let mut settings = FitSettings::from_file(runcard)?;
    if data_path.is_some() {
        settings.data_path = data_path;
    }
    settings.apply_env();
    Ok(settings)
}

fn handle_filter(args: FilterArgs) -> Result<(), AppError> {
    let settings = match &args.runcard {
        Some(path) => Some(load_settings(path, args.data_path.clone())?),
        None => None,
    };

    let (catalog, data_path) = match &settings {
        Some(s) => (SchemaCatalog::with_schemas(&s.schemas)?, s.data_path()?.to_path_buf()),
        None => {
            let _ = dotenvy::dotenv();
            let path = args
                .data_path
                .clone()
                .or_else(|| std::env::var_os(crate::config::DATA_PATH_ENV).map(PathBuf::from))
                .ok_or_else(|| AppError::new(2, "No data path: use --data-path or NNPDF_DATA_PATH."))?;
            (SchemaCatalog::builtin(), path)
        }
    };

    let names: Vec<String> = if !args.datasets.is_empty() {
        args.datasets.clone()
    } else if let Some(s) = &settings {
        s.experiments
            .iter()
            .flat_map(|e| e.datasets.iter().map(|d| d.name.clone()))
            .collect()
    } else {
        catalog.names().map(str::to_string).collect()
    };

    let datasets = pipeline::filter_datasets(&data_path, &catalog, &names)?;
    print!("{}", crate::report::format_dataset_summary(&datasets));

    if let Some(dir) = &args.export {
        for ds in &datasets {
            for path in write_commondata(dir, ds)? {
                log::info!("Wrote {}", path.display());
            }
        }
        println!("Exported {} dataset(s) to {}", datasets.len(), dir.display());
    }
    Ok(())
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let mut settings = load_settings(&args.runcard, args.data_path.clone())?;
    if let Some(n) = args.replicas {
        settings.replicas = n;
    }
    if let Some(first) = args.first_replica {
        settings.first_replica = first;
    }
    if args.threads.is_some() {
        settings.threads = args.threads;
    }
    if args.results_dir.is_some() {
        settings.results_dir = args.results_dir.clone();
    }
    settings.validate()?;

    let cancel = CancelToken::new();
    if let Some(secs) = args.timeout {
        if !(secs.is_finite() && secs > 0.0) {
            return Err(AppError::new(2, "Timeout must be a positive number of seconds."));
        }
        let token = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_secs_f64(secs));
            log::warn!("Timeout of {secs}s reached, aborting running replicas");
            token.cancel();
        });
    }

    let run = pipeline::run_fit(&settings, &cancel)?;

    println!("{}", crate::report::format_run_summary(&settings.fit_name, &run.summary));
    print!("{}", crate::report::format_status_table(&run.outcomes));

    if !run.summary.succeeded() {
        return Err(AppError::new(
            4,
            format!("All {} replica(s) aborted.", run.outcomes.len()),
        ));
    }
    Ok(())
}

fn handle_split(args: SplitArgs) -> Result<(), AppError> {
    let settings = load_settings(&args.runcard, args.data_path.clone())?;
    let loaded = pipeline::load_experiments(&settings)?;
    let splits = pipeline::replica_splits(&settings, &loaded, args.replica)?;
    print!(
        "{}",
        crate::report::format_split_summary(args.replica, loaded.experiments.experiments(), &splits)
    );
    Ok(())
}
