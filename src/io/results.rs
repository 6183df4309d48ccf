//! Per-replica results on disk.
//!
//! Layout under the results directory:
//!
//! ```text
//! nnfit/replica_<N>/chi2exps.log         one CSV row per experiment per logged iteration
//! nnfit/replica_<N>/pdf_evolution.jsonl  one JSON snapshot per logged iteration
//! nnfit/replica_<N>/<fit>.fitinfo        final JSON record (END or ABRT)
//! ```
//!
//! Rows are flushed at iteration boundaries so an aborted replica keeps every
//! complete iteration. A replica only ever writes inside its own folder.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::FitStatus;
use crate::error::AppError;
use crate::fit::chi2::IterationSummary;
use crate::fit::engine::PdfSnapshot;
use crate::fit::seeds::ReplicaSeeds;

pub const CHI2_LOG: &str = "chi2exps.log";
pub const PDF_LOG: &str = "pdf_evolution.jsonl";
pub const TOTAL_ROW: &str = "TOTAL";

pub fn replica_folder(results_dir: &Path, replica: usize) -> PathBuf {
    results_dir.join("nnfit").join(format!("replica_{replica}"))
}

pub fn fitinfo_path(folder: &Path, fit_name: &str) -> PathBuf {
    folder.join(format!("{fit_name}.fitinfo"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chi2Row {
    pub iteration: usize,
    pub experiment: String,
    pub training_chi2: f64,
    pub training_ndata: usize,
    pub validation_chi2: f64,
    pub validation_ndata: usize,
}

/// Final record of a replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitInfo {
    pub fit_name: String,
    pub replica: usize,
    pub status: FitStatus,
    pub reason: Option<String>,
    pub iterations: usize,
    pub best_iteration: usize,
    /// Chi²/N at the best iteration (absent when not finite).
    pub training_chi2: Option<f64>,
    pub validation_chi2: Option<f64>,
    pub training_ndata: usize,
    pub validation_ndata: usize,
    pub parameters: Vec<f64>,
    pub seeds: ReplicaSeeds,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub elapsed_seconds: f64,
}

pub fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

/// Append-only writers for one replica folder.
pub struct ResultsLog {
    folder: PathBuf,
    fit_name: String,
    chi2: csv::Writer<File>,
    pdf: BufWriter<File>,
}

impl ResultsLog {
    /// Create (or reset) the replica folder and open its logs.
    pub fn create(folder: &Path, fit_name: &str) -> Result<Self, AppError> {
        fs::create_dir_all(folder)
            .map_err(|e| AppError::new(2, format!("Failed to create results folder '{}': {e}", folder.display())))?;

        let stale = fitinfo_path(folder, fit_name);
        if stale.exists() {
            fs::remove_file(&stale)
                .map_err(|e| AppError::new(2, format!("Failed to remove '{}': {e}", stale.display())))?;
        }

        let chi2_path = folder.join(CHI2_LOG);
        let chi2 = csv::Writer::from_path(&chi2_path)
            .map_err(|e| AppError::new(2, format!("Failed to create '{}': {e}", chi2_path.display())))?;

        let pdf_path = folder.join(PDF_LOG);
        let pdf = File::create(&pdf_path)
            .map_err(|e| AppError::new(2, format!("Failed to create '{}': {e}", pdf_path.display())))?;

        Ok(Self {
            folder: folder.to_path_buf(),
            fit_name: fit_name.to_string(),
            chi2,
            pdf: BufWriter::new(pdf),
        })
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Log one iteration: a row per experiment plus a total row, then the snapshot.
    pub fn append(&mut self, summary: &IterationSummary, snapshot: &PdfSnapshot) -> Result<(), AppError> {
        let rows = summary
            .experiments
            .iter()
            .map(|e| (e.name.as_str(), e.training, e.validation))
            .chain(std::iter::once((TOTAL_ROW, summary.training, summary.validation)));

        for (name, tr, vl) in rows {
            self.chi2
                .serialize(Chi2Row {
                    iteration: summary.iteration,
                    experiment: name.to_string(),
                    training_chi2: tr.per_point(),
                    training_ndata: tr.ndata,
                    validation_chi2: vl.per_point(),
                    validation_ndata: vl.ndata,
                })
                .map_err(|e| AppError::new(2, format!("Failed to write {CHI2_LOG}: {e}")))?;
        }
        self.chi2
            .flush()
            .map_err(|e| AppError::new(2, format!("Failed to flush {CHI2_LOG}: {e}")))?;

        serde_json::to_writer(&mut self.pdf, snapshot)
            .map_err(|e| AppError::new(2, format!("Failed to write {PDF_LOG}: {e}")))?;
        writeln!(self.pdf).map_err(|e| AppError::new(2, format!("Failed to write {PDF_LOG}: {e}")))?;
        self.pdf
            .flush()
            .map_err(|e| AppError::new(2, format!("Failed to flush {PDF_LOG}: {e}")))?;
        Ok(())
    }

    pub fn write_fitinfo(&self, info: &FitInfo) -> Result<PathBuf, AppError> {
        write_fitinfo(&self.folder, &self.fit_name, info)
    }
}

/// Write `<fit>.fitinfo` atomically (temp file, then rename).
pub fn write_fitinfo(folder: &Path, fit_name: &str, info: &FitInfo) -> Result<PathBuf, AppError> {
    let path = fitinfo_path(folder, fit_name);
    let tmp = folder.join(format!(".{fit_name}.fitinfo.tmp"));

    let file = File::create(&tmp)
        .map_err(|e| AppError::new(2, format!("Failed to create '{}': {e}", tmp.display())))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, info)
        .map_err(|e| AppError::new(2, format!("Failed to write fitinfo: {e}")))?;
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to write fitinfo: {e}")))?;
    drop(writer);

    fs::rename(&tmp, &path)
        .map_err(|e| AppError::new(2, format!("Failed to move fitinfo into '{}': {e}", path.display())))?;
    Ok(path)
}

pub fn read_fitinfo(path: &Path) -> Result<FitInfo, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open fitinfo '{}': {e}", path.display())))?;
    serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid fitinfo '{}': {e}", path.display())))
}

pub fn read_chi2_log(path: &Path) -> Result<Vec<Chi2Row>, AppError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| AppError::new(2, format!("Failed to open '{}': {e}", path.display())))?;
    reader
        .deserialize()
        .collect::<Result<Vec<Chi2Row>, _>>()
        .map_err(|e| AppError::new(2, format!("Invalid chi2 log '{}': {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::chi2::{Chi2, ExperimentChi2};

    fn summary(iteration: usize) -> IterationSummary {
        IterationSummary::new(
            iteration,
            vec![
                ExperimentChi2 {
                    name: "CMS".to_string(),
                    training: Chi2 { value: 4.0, ndata: 2 },
                    validation: Chi2 { value: 3.0, ndata: 1 },
                },
                ExperimentChi2 {
                    name: "ATLAS".to_string(),
                    training: Chi2 { value: 0.0, ndata: 0 },
                    validation: Chi2 { value: 1.0, ndata: 1 },
                },
            ],
        )
    }

    fn info(status: FitStatus) -> FitInfo {
        let now = Utc::now();
        FitInfo {
            fit_name: "test".to_string(),
            replica: 3,
            status,
            reason: None,
            iterations: 10,
            best_iteration: 7,
            training_chi2: Some(1.2),
            validation_chi2: finite(f64::NAN),
            training_ndata: 2,
            validation_ndata: 2,
            parameters: vec![1.0, 2.0],
            seeds: ReplicaSeeds {
                trvl: 1,
                nn: 2,
                mc: Some(3),
            },
            started: now,
            finished: now,
            elapsed_seconds: 0.5,
        }
    }

    #[test]
    fn appends_rows_and_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let folder = replica_folder(dir.path(), 3);
        let mut log = ResultsLog::create(&folder, "test").unwrap();
        let snap = PdfSnapshot {
            iteration: 1,
            parameters: vec![0.5],
        };
        log.append(&summary(1), &snap).unwrap();
        log.append(&summary(2), &snap).unwrap();

        let rows = read_chi2_log(&folder.join(CHI2_LOG)).unwrap();
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0].experiment, "CMS");
        assert_eq!(rows[0].training_chi2, 2.0);
        assert_eq!(rows[1].training_ndata, 0);
        assert_eq!(rows[2].experiment, TOTAL_ROW);
        assert_eq!(rows[2].validation_ndata, 2);
        assert_eq!(rows[5].iteration, 2);

        let pdf = fs::read_to_string(folder.join(PDF_LOG)).unwrap();
        assert_eq!(pdf.lines().count(), 2);
        assert!(folder.ends_with("nnfit/replica_3"));
    }

    #[test]
    fn fitinfo_round_trip_and_reset() {
        let dir = tempfile::tempdir().unwrap();
        let folder = replica_folder(dir.path(), 1);
        let log = ResultsLog::create(&folder, "test").unwrap();
        let path = log.write_fitinfo(&info(FitStatus::End)).unwrap();
        let back = read_fitinfo(&path).unwrap();
        assert_eq!(back.status, FitStatus::End);
        assert_eq!(back.validation_chi2, None);
        assert_eq!(back.parameters, vec![1.0, 2.0]);

        // Re-creating the folder drops the previous run's fitinfo.
        ResultsLog::create(&folder, "test").unwrap();
        assert!(!path.exists());
    }
}
