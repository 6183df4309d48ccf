//! Driving a single replica through INIT → ITER* → END | ABRT.
//!
//! Every failure inside a replica (data setup, minimizer, results I/O) is
//! caught here and turned into an `ABRT` outcome; nothing propagates to the
//! other replicas.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::config::FitSettings;
use crate::domain::FitStatus;
use crate::error::AppError;
use crate::experiment::{ExperimentSet, replica_values, split};
use crate::fit::chi2::{IterationSummary, ReplicaData};
use crate::fit::engine::{Minimizer, PdfSnapshot};
use crate::fit::runner::CancelToken;
use crate::fit::seeds::ReplicaSeeds;
use crate::fit::state::ReplicaState;
use crate::fit::stopping::StoppingTracker;
use crate::io::results::{FitInfo, ResultsLog, finite, replica_folder, write_fitinfo};

/// Read-only inputs shared by every replica of a run.
#[derive(Debug, Clone, Copy)]
pub struct FitContext<'a> {
    pub settings: &'a FitSettings,
    pub experiments: &'a ExperimentSet,
    /// Training fraction per dataset, one vector per experiment.
    pub fractions: &'a [Vec<f64>],
    pub results_dir: &'a Path,
}

#[derive(Debug, Clone)]
pub struct ReplicaOutcome {
    pub replica: usize,
    pub status: FitStatus,
    pub iterations: usize,
    pub reason: Option<String>,
    /// Summary at the best monitored iteration.
    pub best: Option<IterationSummary>,
    pub folder: PathBuf,
}

#[derive(Debug, Default)]
struct Progress {
    best: Option<(IterationSummary, PdfSnapshot)>,
}

pub fn run_replica<M: Minimizer>(
    ctx: &FitContext<'_>,
    engine: &M,
    replica: usize,
    cancel: &CancelToken,
) -> ReplicaOutcome {
    let started = Utc::now();
    let clock = Instant::now();
    let seeds = ReplicaSeeds::derive(replica, &ctx.settings.seeds, ctx.settings.genrep);
    let folder = replica_folder(ctx.results_dir, replica);

    let mut state = ReplicaState::new(replica, folder.clone(), seeds);
    let mut progress = Progress::default();

    if let Err(err) = drive(ctx, engine, &mut state, &mut progress, cancel, started, clock) {
        log::warn!("Replica {replica} aborted: {err}");
        if !state.status().is_terminal() {
            // Init and Iter can always move to Abrt.
            let _ = state.abort(err.message());
        }
    }

    if state.status() == FitStatus::Abrt {
        let info = fit_info(ctx, &state, &progress, started, clock);
        if folder.is_dir() {
            if let Err(err) = write_fitinfo(&folder, &ctx.settings.fit_name, &info) {
                log::warn!("Replica {replica}: could not record ABRT status: {err}");
            }
        }
    }

    ReplicaOutcome {
        replica,
        status: state.status(),
        iterations: state.iteration,
        reason: state.reason().map(str::to_string),
        best: progress.best.map(|(summary, _)| summary),
        folder,
    }
}

fn drive<M: Minimizer>(
    ctx: &FitContext<'_>,
    engine: &M,
    state: &mut ReplicaState,
    progress: &mut Progress,
    cancel: &CancelToken,
    started: DateTime<Utc>,
    clock: Instant,
) -> Result<(), AppError> {
    let settings = ctx.settings;

    // INIT
    let mut log = ResultsLog::create(&state.folder, &settings.fit_name)?;
    state.pseudodata = replica_values(ctx.experiments, state.seeds.mc)?;
    state.splits = ctx
        .experiments
        .iter()
        .zip(ctx.fractions)
        .map(|(exp, fracs)| split(exp, state.seeds.trvl, fracs))
        .collect::<Result<_, _>>()?;
    let data = ReplicaData::build(ctx.experiments, &state.pseudodata, &state.splits)?;
    let mut handle = engine.initialize(state.seeds.nn)?;
    let mut tracker = StoppingTracker::new(&settings.stopping);

    log::debug!(
        "Replica {}: {} training / {} validation points",
        state.replica,
        data.training_total.ndata(),
        data.validation_total.ndata()
    );
    state.transition(FitStatus::Iter)?;

    // ITER
    loop {
        let iteration = state.iteration + 1;
        handle = engine.step(handle, std::slice::from_ref(&data.training_total))?;
        state.iteration = iteration;

        let summary = data.summarize(iteration, |subset| engine.evaluate(&handle, subset));
        let snapshot = engine.snapshot(&handle);
        let observation = tracker.observe(&summary, clock.elapsed(), cancel.is_cancelled());
        if observation.improved {
            progress.best = Some((summary.clone(), snapshot.clone()));
        }

        let terminal = observation.decision.terminal_status();
        if iteration % settings.log_frequency == 0 || terminal.is_some() {
            log.append(&summary, &snapshot)?;
        }
        log::debug!(
            "Replica {} iteration {iteration}: training {:.4} validation {:.4}",
            state.replica,
            summary.training.per_point(),
            summary.validation.per_point()
        );

        match terminal {
            None => state.transition(FitStatus::Iter)?,
            Some(FitStatus::End) => {
                let reason = observation.decision.reason();
                // fitinfo goes to disk before the state becomes final.
                let mut info = fit_info(ctx, state, progress, started, clock);
                info.status = FitStatus::End;
                info.reason = Some(reason.clone());
                log.write_fitinfo(&info)?;
                state.finish(reason)?;
                return Ok(());
            }
            Some(_) => {
                state.abort(observation.decision.reason())?;
                return Ok(());
            }
        }
    }
}

fn fit_info(
    ctx: &FitContext<'_>,
    state: &ReplicaState,
    progress: &Progress,
    started: DateTime<Utc>,
    clock: Instant,
) -> FitInfo {
    let (best_iteration, training, validation, parameters) = match &progress.best {
        Some((summary, snapshot)) => (
            summary.iteration,
            summary.training,
            summary.validation,
            snapshot.parameters.clone(),
        ),
        None => (0, Default::default(), Default::default(), Vec::new()),
    };
    FitInfo {
        fit_name: ctx.settings.fit_name.clone(),
        replica: state.replica,
        status: state.status(),
        reason: state.reason().map(str::to_string),
        iterations: state.iteration,
        best_iteration,
        training_chi2: progress.best.as_ref().and_then(|_| finite(training.per_point())),
        validation_chi2: progress.best.as_ref().and_then(|_| finite(validation.per_point())),
        training_ndata: training.ndata,
        validation_ndata: validation.ndata,
        parameters,
        seeds: state.seeds,
        started,
        finished: Utc::now(),
        elapsed_seconds: clock.elapsed().as_secs_f64(),
    }
}
