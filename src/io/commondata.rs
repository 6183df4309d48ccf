//! Export filtered datasets in the commondata text format.
//!
//! Two files per dataset:
//!
//! - `DATA_<name>.dat`: header `<name> <nsys> <ndata>`, then one line per point
//!   `i process k1 k2 k3 data stat (add mult)*nsys`
//! - `SYSTYPE_<name>_DEFAULT.dat`: `nsys`, then `i TYPE NAME` per systematic

use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::domain::Dataset;
use crate::error::AppError;

pub fn data_file_name(dataset: &Dataset) -> String {
    format!("DATA_{}.dat", dataset.name())
}

pub fn systype_file_name(dataset: &Dataset) -> String {
    format!("SYSTYPE_{}_DEFAULT.dat", dataset.name())
}

/// Write both commondata files into `dir` (created if needed). Returns the written paths.
pub fn write_commondata(dir: &Path, dataset: &Dataset) -> Result<Vec<PathBuf>, AppError> {
    create_dir_all(dir)
        .map_err(|e| AppError::new(2, format!("Failed to create export dir '{}': {e}", dir.display())))?;

    let data_path = dir.join(data_file_name(dataset));
    let file = File::create(&data_path)
        .map_err(|e| AppError::new(2, format!("Failed to create '{}': {e}", data_path.display())))?;
    write_data_table(BufWriter::new(file), dataset)
        .map_err(|e| AppError::new(2, format!("Failed to write '{}': {e}", data_path.display())))?;

    let systype_path = dir.join(systype_file_name(dataset));
    let file = File::create(&systype_path)
        .map_err(|e| AppError::new(2, format!("Failed to create '{}': {e}", systype_path.display())))?;
    write_systype_table(BufWriter::new(file), dataset)
        .map_err(|e| AppError::new(2, format!("Failed to write '{}': {e}", systype_path.display())))?;

    Ok(vec![data_path, systype_path])
}

pub fn write_data_table<W: Write>(mut out: W, dataset: &Dataset) -> std::io::Result<()> {
    writeln!(out, "{}\t{}\t{}", dataset.name(), dataset.n_sys(), dataset.n_data())?;
    for (i, p) in dataset.points().iter().enumerate() {
        write!(
            out,
            "{}\t{}\t{:.12e}\t{:.12e}\t{:.12e}\t{:.12e}\t{:.12e}",
            i + 1,
            dataset.process(),
            p.kinematics.k1,
            p.kinematics.k2,
            p.kinematics.k3,
            p.central,
            p.stat
        )?;
        for sys in &p.systematics {
            write!(out, "\t{:.12e}\t{:.12e}", sys.add, sys.mult)?;
        }
        writeln!(out)?;
    }
    out.flush()
}

/// Systematic types and names are taken from the first point.
pub fn write_systype_table<W: Write>(mut out: W, dataset: &Dataset) -> std::io::Result<()> {
    writeln!(out, "{}", dataset.n_sys())?;
    if let Some(first) = dataset.points().first() {
        for (i, sys) in first.systematics.iter().enumerate() {
            writeln!(out, "{}\t{}\t{}", i + 1, sys.kind.label(), sys.name)?;
        }
    }
    out.flush()
}
