//! Experimental covariance matrix from statistical and systematic uncertainties.
//!
//! ```text
//! C_ij = δ_ij stat_i² + δ_ij Σ_uncorr add_i² + Σ_k S_ik S_jk
//! ```
//!
//! where `S` has one column per correlation key. A systematic's key is its name
//! for cross-dataset categories (e.g. a shared luminosity), the pair
//! `(dataset, column)` for `CORR`/`THEORYCORR`, and none for uncorrelated
//! categories. `SKIP` systematics are left out.

use std::collections::HashMap;

use nalgebra::{DMatrix, DVector};

use crate::domain::{Correlation, Dataset};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CorrelationKey<'a> {
    Named(&'a str),
    Intra { dataset: usize, column: usize },
}

/// Covariance of the concatenated points of `datasets`, in order.
///
/// Dataset positions in the iteration order tell `CORR` sources apart, so the
/// same call serves one experiment or every experiment of a fit.
pub fn build_covariance<'a, I>(datasets: I) -> DMatrix<f64>
where
    I: IntoIterator<Item = &'a Dataset>,
{
    let datasets: Vec<&Dataset> = datasets.into_iter().collect();
    let n: usize = datasets.iter().map(|d| d.n_data()).sum();

    let mut diag = DVector::<f64>::zeros(n);
    let mut keys: HashMap<CorrelationKey<'_>, usize> = HashMap::new();
    let mut entries: Vec<(usize, usize, f64)> = Vec::new();

    let mut row = 0usize;
    for (d, dataset) in datasets.iter().enumerate() {
        for point in dataset.points() {
            diag[row] += point.stat * point.stat;
            for (column, sys) in point.systematics.iter().enumerate() {
                let key = match sys.correlation() {
                    Correlation::Skipped => continue,
                    Correlation::Uncorrelated => {
                        diag[row] += sys.add * sys.add;
                        continue;
                    }
                    Correlation::IntraDataset => CorrelationKey::Intra { dataset: d, column },
                    Correlation::Named(name) => CorrelationKey::Named(name),
                };
                let next = keys.len();
                let k = *keys.entry(key).or_insert(next);
                entries.push((row, k, sys.add));
            }
            row += 1;
        }
    }

    let mut s = DMatrix::<f64>::zeros(n, keys.len());
    for (i, k, add) in entries {
        s[(i, k)] += add;
    }

    let mut cov = &s * s.transpose();
    for i in 0..n {
        cov[(i, i)] += diag[i];
    }
    cov
}

/// Restrict a covariance matrix to the given indices (in the given order).
pub fn sub_covariance(cov: &DMatrix<f64>, indices: &[usize]) -> DMatrix<f64> {
    let k = indices.len();
    DMatrix::from_fn(k, k, |a, b| cov[(indices[a], indices[b])])
}
