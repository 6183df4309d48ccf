//! Raw table → `Dataset` conversion.
//!
//! This module is responsible for turning one raw experimental table into a
//! clean, normalized set of data points.
//!
//! Design goals:
//! - **Strict input**: a missing file, a short table, or a malformed line is a
//!   fatal error naming the file and line (no silently zero-filled values)
//! - **Deterministic behavior**: same file in, bit-identical dataset out
//! - **Schema-driven**: one code path for every dataset, no per-dataset types

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::data::catalog::SchemaCatalog;
use crate::data::schema::{Column, DatasetSchema, KinematicRule, SysUnit};
use crate::data::symmetrize::symmetrize;
use crate::domain::{DataPoint, Dataset, Kinematics, SysKind, SystematicUncertainty};
use crate::error::AppError;

/// Capability of producing a filtered dataset by name.
pub trait DatasetFilter {
    fn read_data(&self, name: &str) -> Result<Dataset, AppError>;
}

/// Filter driven by the schemas of a catalog, reading from `<data_path>/rawdata`.
#[derive(Debug, Clone)]
pub struct SchemaFilter<'a> {
    data_path: PathBuf,
    catalog: &'a SchemaCatalog,
}

impl<'a> SchemaFilter<'a> {
    pub fn new(data_path: impl Into<PathBuf>, catalog: &'a SchemaCatalog) -> Self {
        Self {
            data_path: data_path.into(),
            catalog,
        }
    }
}

impl DatasetFilter for SchemaFilter<'_> {
    fn read_data(&self, name: &str) -> Result<Dataset, AppError> {
        let schema = self.catalog.get(name)?;
        read_data(&self.data_path, schema)
    }
}

/// Open `<data_path>/rawdata/<name>/<name>.data` and filter it.
pub fn read_data(data_path: &Path, schema: &DatasetSchema) -> Result<Dataset, AppError> {
    schema.validate()?;
    let path = schema.data_file(data_path);
    let file = File::open(&path).map_err(|e| {
        AppError::new(
            2,
            format!("Error opening data file {}: {e}", path.display()),
        )
    })?;
    let dataset = parse_dataset(BufReader::new(file), &path, schema)?;
    log::debug!(
        "Filtered {}: {} points, {} systematics",
        dataset.name(),
        dataset.n_data(),
        dataset.n_sys()
    );
    Ok(dataset)
}

/// Filter an already opened table. `source` is only used in error messages.
pub fn parse_dataset<R: BufRead>(reader: R, source: &Path, schema: &DatasetSchema) -> Result<Dataset, AppError> {
    let mut points = Vec::with_capacity(schema.n_data);
    let mut trailing = 0usize;

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|e| {
            AppError::new(
                2,
                format!("{}:{line_no}: read error: {e}", source.display()),
            )
        })?;
        // Every line up to n_data is a data row, blank or not.
        if points.len() == schema.n_data {
            if !line.trim().is_empty() {
                trailing += 1;
            }
            continue;
        }
        let point = parse_line(&line, schema)
            .map_err(|msg| AppError::new(3, format!("{}:{line_no}: {msg}", source.display())))?;
        points.push(point);
    }

    if points.len() < schema.n_data {
        return Err(AppError::new(
            3,
            format!(
                "{}: expected {} data lines, found {}.",
                source.display(),
                schema.n_data,
                points.len()
            ),
        ));
    }
    if trailing > 0 {
        log::warn!(
            "{}: ignoring {trailing} line(s) after the {} declared data points",
            source.display(),
            schema.n_data
        );
    }

    Dataset::new(&schema.name, &schema.process, schema.n_data, schema.n_sys(), points)
}

/// A systematic column as read, before normalization against the central value.
enum RawSys<'a> {
    Asymmetric { name: &'a str, high: f64, low: f64 },
    Symmetric { name: &'a str, unit: SysUnit, kind: SysKind, value: f64 },
}

fn parse_line(line: &str, schema: &DatasetSchema) -> Result<DataPoint, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let expected = schema.n_tokens();
    if tokens.len() != expected {
        return Err(format!(
            "expected {expected} columns, found {}",
            tokens.len()
        ));
    }

    let mut central = None;
    let mut stat = 0.0;
    let mut energy_gev = 0.0;
    let mut kin = Kinematics::default();
    let mut raw_sys = Vec::with_capacity(schema.n_sys());

    let mut cursor = 0usize;
    for column in &schema.columns {
        let width = column.width();
        let fields = &tokens[cursor..cursor + width];
        cursor += width;

        match column {
            Column::Index | Column::Skip => {
                parse_number(fields[0], column)?;
            }
            Column::Energy { unit } => energy_gev = parse_number(fields[0], column)? * unit.to_gev(),
            Column::Central => central = Some(parse_number(fields[0], column)?),
            Column::Stat => stat = parse_number(fields[0], column)?,
            Column::Kin1 => kin.k1 = parse_number(fields[0], column)?,
            Column::Kin2 => kin.k2 = parse_number(fields[0], column)?,
            Column::Kin3 => kin.k3 = parse_number(fields[0], column)?,
            Column::AsymmetricSys { name } => raw_sys.push(RawSys::Asymmetric {
                name,
                high: parse_number(fields[0], column)?,
                low: parse_number(fields[1], column)?,
            }),
            Column::Sys { name, unit, kind } => raw_sys.push(RawSys::Symmetric {
                name,
                unit: *unit,
                kind: *kind,
                value: parse_number(fields[0], column)?,
            }),
        }
    }

    let central = central.ok_or_else(|| "schema has no central value column".to_string())?;
    if !raw_sys.is_empty() && central == 0.0 {
        return Err("central value is zero; systematics cannot be expressed in percent".to_string());
    }

    if let KinematicRule::TopPair { top_mass } = schema.kinematics {
        kin = Kinematics {
            k1: 0.0,
            k2: top_mass * top_mass,
            k3: energy_gev,
        };
    }

    // Percentages are taken relative to the unshifted central value; the
    // accumulated shift is applied once, after every systematic is built.
    let mut shift = 0.0;
    let mut systematics = Vec::with_capacity(raw_sys.len());
    for sys in raw_sys {
        match sys {
            RawSys::Asymmetric { name, high, low } => {
                let s = symmetrize(high / central * 100.0, low / central * 100.0);
                shift += s.delta;
                systematics.push(SystematicUncertainty::multiplicative(name, s.sigma, central));
            }
            RawSys::Symmetric {
                name,
                unit: SysUnit::Absolute,
                kind,
                value,
            } => systematics.push(SystematicUncertainty::from_absolute(name, kind, value, central)),
            RawSys::Symmetric {
                name,
                unit: SysUnit::Percent,
                kind,
                value,
            } => {
                let mut sys = SystematicUncertainty::multiplicative(name, value, central);
                sys.kind = kind;
                systematics.push(sys);
            }
        }
    }

    let mut point = DataPoint {
        kinematics: kin,
        central,
        stat,
        systematics,
    };
    point.apply_shift(shift);
    Ok(point)
}

fn parse_number(token: &str, column: &Column) -> Result<f64, String> {
    let value: f64 = token
        .parse()
        .map_err(|_| format!("invalid {} '{token}'", column.label()))?;
    if !value.is_finite() {
        return Err(format!("non-finite {} '{token}'", column.label()));
    }
    Ok(value)
}
