//! Reference parameterization of the fitted observable.
//!
//! The engine only needs one primitive: predict a value at a kinematic point
//! given a parameter vector. The reference model is a polynomial in the log of
//! the centre-of-mass energy, exponentiated so predictions stay positive:
//!
//! ```text
//! σ(√s) = exp(p0 + p1 L + p2 L² + ...),   L = ln(√s / E_ref)
//! ```

use nalgebra::DVector;

use crate::domain::Kinematics;

pub trait Parameterization: Send + Sync {
    fn n_params(&self) -> usize;

    fn predict(&self, params: &[f64], kinematics: &Kinematics) -> f64;

    fn predict_all(&self, params: &[f64], kinematics: &[Kinematics]) -> DVector<f64> {
        DVector::from_iterator(kinematics.len(), kinematics.iter().map(|k| self.predict(params, k)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogPolynomial {
    pub degree: usize,
    /// Energy (GeV) at which `L = 0`.
    pub reference_energy: f64,
}

impl Parameterization for LogPolynomial {
    fn n_params(&self) -> usize {
        self.degree + 1
    }

    fn predict(&self, params: &[f64], kinematics: &Kinematics) -> f64 {
        let l = (kinematics.k3 / self.reference_energy).ln();
        // Horner
        let exponent = params.iter().rev().fold(0.0, |acc, p| acc * l + p);
        exponent.exp()
    }
}
