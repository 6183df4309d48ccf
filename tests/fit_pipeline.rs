//! End-to-end runs over the bundled CMS top-pair data.

use std::fs;
use std::path::{Path, PathBuf};

use nnfit::app::pipeline::{load_experiments, replica_splits, run_fit};
use nnfit::config::FitSettings;
use nnfit::domain::FitStatus;
use nnfit::fit::CancelToken;
use nnfit::io::{CHI2_LOG, PDF_LOG, fitinfo_path, read_chi2_log, read_fitinfo};

fn data_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("data")
}

fn settings(results: &Path) -> FitSettings {
    let mut settings: FitSettings = serde_json::from_str(
        r#"{
            "fit_name": "itest",
            "experiments": [
                { "name": "CMS", "datasets": [
                    { "name": "CMSTTBARTOT", "frac": 0.75 },
                    { "name": "CMSTTBARTOT13TEV", "frac": 1.0 }
                ] }
            ],
            "replicas": 2,
            "stopping": { "max_iterations": 20 },
            "minimizer": { "degree": 2, "initial": [5.5, 2.4, 0.0], "mutants": 10 },
            "log_frequency": 5
        }"#,
    )
    .unwrap();
    settings.data_path = Some(data_dir());
    settings.results_dir = Some(results.to_path_buf());
    settings.validate().unwrap();
    settings
}

#[test]
fn replicas_end_with_isolated_folders() {
    let results = tempfile::tempdir().unwrap();
    let settings = settings(results.path());

    let run = run_fit(&settings, &CancelToken::new()).unwrap();
    assert_eq!(run.outcomes.len(), 2);
    assert_eq!(run.summary.n_end, 2);
    assert!(run.summary.succeeded());

    for outcome in &run.outcomes {
        assert_eq!(outcome.status, FitStatus::End);
        let folder = results.path().join("nnfit").join(format!("replica_{}", outcome.replica));
        assert_eq!(outcome.folder, folder);

        let info = read_fitinfo(&fitinfo_path(&folder, "itest")).unwrap();
        assert_eq!(info.status, FitStatus::End);
        assert_eq!(info.iterations, 20);
        assert_eq!(info.parameters.len(), 3);
        // 3 of 4 CMSTTBARTOT points plus the 13 TeV point train; one validates.
        assert_eq!(info.training_ndata, 4);
        assert_eq!(info.validation_ndata, 1);

        // Iterations 5, 10, 15, 20: one experiment row plus the total each.
        let rows = read_chi2_log(&folder.join(CHI2_LOG)).unwrap();
        assert_eq!(rows.len(), 8);
        let snapshots = fs::read_to_string(folder.join(PDF_LOG)).unwrap();
        assert_eq!(snapshots.lines().count(), 4);
    }

    let entries: Vec<_> = fs::read_dir(results.path().join("nnfit")).unwrap().collect();
    assert_eq!(entries.len(), 2);
}

#[test]
fn diverging_replicas_abort_and_the_run_fails() {
    let results = tempfile::tempdir().unwrap();
    let mut settings = settings(results.path());
    settings.stopping.abort_chi2 = 1.0e-12;

    let run = run_fit(&settings, &CancelToken::new()).unwrap();
    assert_eq!(run.summary.n_abrt, 2);
    assert!(!run.summary.succeeded());
    for outcome in &run.outcomes {
        assert_eq!(outcome.status, FitStatus::Abrt);
        assert_eq!(outcome.iterations, 1);
        let info = read_fitinfo(&fitinfo_path(&outcome.folder, "itest")).unwrap();
        assert_eq!(info.status, FitStatus::Abrt);
        assert!(info.reason.unwrap().contains("abort threshold"));
    }
}

#[test]
fn split_preview_matches_configuration() {
    let results = tempfile::tempdir().unwrap();
    let settings = settings(results.path());
    let loaded = load_experiments(&settings).unwrap();
    assert_eq!(loaded.experiments.experiments()[0].n_points(), 5);
    assert_eq!(loaded.experiments.n_points(), 5);

    let a = replica_splits(&settings, &loaded, 1).unwrap();
    let b = replica_splits(&settings, &loaded, 1).unwrap();
    assert_eq!(a, b);
    assert_eq!(a[0].train.len(), 4);
    assert!(a[0].train.contains(&4));
    assert!(a[0].covers(5));
}

#[test]
fn missing_dataset_file_is_fatal() {
    let results = tempfile::tempdir().unwrap();
    let mut settings = settings(results.path());
    settings.data_path = Some(results.path().join("nowhere"));

    let err = load_experiments(&settings).unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert!(err.message().contains("CMSTTBARTOT.data"));
}
