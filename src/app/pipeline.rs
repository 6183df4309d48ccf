//! Shared workflow used by the `filter`, `fit` and `split` commands.
//!
//! runcard -> dataset filters -> experiments -> replica pool -> outcomes
//!
//! Filtering is single-threaded and completes before any replica starts;
//! dataset errors abort the whole run.

use std::path::Path;

use crate::config::FitSettings;
use crate::data::{DatasetFilter, SchemaCatalog, SchemaFilter};
use crate::domain::Dataset;
use crate::error::AppError;
use crate::experiment::{Experiment, ExperimentSet, TrainValidSplit, split};
use crate::fit::{CancelToken, FitContext, GeneticMinimizer, ReplicaOutcome, ReplicaSeeds, run_replicas};
use crate::report::RunSummary;

/// Experiments of a runcard with the training fractions of their datasets.
#[derive(Debug, Clone)]
pub struct LoadedExperiments {
    pub experiments: ExperimentSet,
    pub fractions: Vec<Vec<f64>>,
}

/// All outputs of a `nnfit fit` run.
#[derive(Debug, Clone)]
pub struct FitRun {
    pub outcomes: Vec<ReplicaOutcome>,
    pub summary: RunSummary,
}

/// Filter the named datasets with the given catalog.
pub fn filter_datasets(data_path: &Path, catalog: &SchemaCatalog, names: &[String]) -> Result<Vec<Dataset>, AppError> {
    let filter = SchemaFilter::new(data_path, catalog);
    names
        .iter()
        .map(|name| {
            let ds = filter.read_data(name)?;
            log::info!("Filtered {name}: {} points, {} systematics", ds.n_data(), ds.n_sys());
            Ok(ds)
        })
        .collect()
}

pub fn load_experiments(settings: &FitSettings) -> Result<LoadedExperiments, AppError> {
    let data_path = settings.data_path()?;
    let catalog = SchemaCatalog::with_schemas(&settings.schemas)?;

    let mut experiments = Vec::with_capacity(settings.experiments.len());
    let mut fractions = Vec::with_capacity(settings.experiments.len());
    for spec in &settings.experiments {
        let names: Vec<String> = spec.datasets.iter().map(|d| d.name.clone()).collect();
        let datasets = filter_datasets(data_path, &catalog, &names)?;
        let experiment = Experiment::from_datasets(&spec.name, datasets)?;
        log::info!(
            "Experiment {}: {} datasets, {} points",
            experiment.name(),
            experiment.datasets().len(),
            experiment.n_points()
        );
        experiments.push(experiment);
        fractions.push(settings.fractions(spec));
    }

    let experiments = ExperimentSet::new(experiments)?;
    log::info!("Fitting {} points in total", experiments.n_points());
    Ok(LoadedExperiments { experiments, fractions })
}

/// Splits of every experiment for one replica, exactly as the fit would draw them.
pub fn replica_splits(
    settings: &FitSettings,
    loaded: &LoadedExperiments,
    replica: usize,
) -> Result<Vec<TrainValidSplit>, AppError> {
    if replica == 0 {
        return Err(AppError::new(2, "Replica numbering starts at 1."));
    }
    let seeds = ReplicaSeeds::derive(replica, &settings.seeds, settings.genrep);
    loaded
        .experiments
        .iter()
        .zip(&loaded.fractions)
        .map(|(exp, fracs)| split(exp, seeds.trvl, fracs))
        .collect()
}

/// Load the data and fit every configured replica.
pub fn run_fit(settings: &FitSettings, cancel: &CancelToken) -> Result<FitRun, AppError> {
    let loaded = load_experiments(settings)?;
    let results_dir = settings.results_dir()?;
    let engine = GeneticMinimizer::from_settings(&settings.minimizer)?;

    let ctx = FitContext {
        settings,
        experiments: &loaded.experiments,
        fractions: &loaded.fractions,
        results_dir,
    };
    let outcomes = run_replicas(&ctx, &engine, &settings.replica_indices(), settings.threads, cancel)?;
    let summary = RunSummary::from_outcomes(&outcomes);

    Ok(FitRun { outcomes, summary })
}
