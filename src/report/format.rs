//! Plain-text tables for the terminal.

use crate::domain::Dataset;
use crate::experiment::{Experiment, TrainValidSplit};
use crate::fit::ReplicaOutcome;
use crate::report::RunSummary;

/// One line per dataset: name, process, points, systematics and central-value range.
pub fn format_dataset_summary(datasets: &[Dataset]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<20} {:<10} {:>5} {:>5} {:>12} {:>12}\n",
        "dataset", "process", "ndata", "nsys", "min", "max"
    ));
    for ds in datasets {
        let (min, max) = ds
            .points()
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| (lo.min(p.central), hi.max(p.central)));
        out.push_str(&format!(
            "{:<20} {:<10} {:>5} {:>5} {:>12.4} {:>12.4}\n",
            truncate(ds.name(), 20),
            truncate(ds.process(), 10),
            ds.n_data(),
            ds.n_sys(),
            min,
            max
        ));
    }
    out
}

pub fn format_split_summary(replica: usize, experiments: &[Experiment], splits: &[TrainValidSplit]) -> String {
    let mut out = String::new();
    out.push_str(&format!("Replica {replica} training/validation split\n"));
    for (exp, split) in experiments.iter().zip(splits) {
        out.push_str(&format!(
            "{:<20} train={:<4} valid={:<4} train_idx={} valid_idx={}\n",
            truncate(exp.name(), 20),
            split.train.len(),
            split.valid.len(),
            fmt_indices(&split.train),
            fmt_indices(&split.valid)
        ));
    }
    out
}

/// Final state of every replica.
pub fn format_status_table(outcomes: &[ReplicaOutcome]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:>7} {:<6} {:>6} {:>12} {:>12}  {}\n",
        "replica", "status", "iter", "chi2_tr/N", "chi2_vl/N", "reason"
    ));
    for o in outcomes {
        let (tr, vl) = match &o.best {
            Some(b) => (fmt_chi2(b.training.per_point()), fmt_chi2(b.validation.per_point())),
            None => ("-".to_string(), "-".to_string()),
        };
        out.push_str(&format!(
            "{:>7} {:<6} {:>6} {:>12} {:>12}  {}\n",
            o.replica,
            o.status.label(),
            o.iterations,
            tr,
            vl,
            o.reason.as_deref().unwrap_or("")
        ));
    }
    out
}

pub fn format_run_summary(fit_name: &str, summary: &RunSummary) -> String {
    let mut out = format!(
        "=== nnfit - {fit_name} ===\nReplicas: END={} ABRT={}\n",
        summary.n_end, summary.n_abrt
    );
    if let (Some(mean), Some(std)) = (summary.validation_mean, summary.validation_std) {
        out.push_str(&format!("Best monitored chi2/N over END replicas: {mean:.4} +/- {std:.4}\n"));
    }
    out
}

fn fmt_chi2(v: f64) -> String {
    if v.is_finite() { format!("{v:.4}") } else { "nan".to_string() }
}

fn fmt_indices(v: &[usize]) -> String {
    let parts: Vec<String> = v.iter().map(|i| i.to_string()).collect();
    format!("[{}]", parts.join(","))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut t: String = s.chars().take(max.saturating_sub(1)).collect();
        t.push('~');
        t
    }
}
