//! Running many replicas on a thread pool.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use crate::error::AppError;
use crate::fit::engine::Minimizer;
use crate::fit::replica::{FitContext, ReplicaOutcome, run_replica};

/// Shared abort flag, checked by every replica once per iteration.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Fit every replica in `replicas`; outcomes come back ordered by replica index.
pub fn run_replicas<M: Minimizer>(
    ctx: &FitContext<'_>,
    engine: &M,
    replicas: &[usize],
    threads: Option<usize>,
    cancel: &CancelToken,
) -> Result<Vec<ReplicaOutcome>, AppError> {
    let unique: BTreeSet<usize> = replicas.iter().copied().collect();
    if unique.len() != replicas.len() {
        return Err(AppError::new(2, "Replica indices must be unique."));
    }
    if unique.contains(&0) {
        return Err(AppError::new(2, "Replica numbering starts at 1."));
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    let pool = builder
        .build()
        .map_err(|e| AppError::new(4, format!("Failed to start replica thread pool: {e}")))?;

    log::info!(
        "Fitting {} replica(s) on {} thread(s)",
        replicas.len(),
        pool.current_num_threads()
    );

    let mut outcomes: Vec<ReplicaOutcome> = pool.install(|| {
        unique
            .par_iter()
            .map(|&replica| run_replica(ctx, engine, replica, cancel))
            .collect()
    });
    outcomes.sort_by_key(|o| o.replica);
    Ok(outcomes)
}
