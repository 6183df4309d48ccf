//! Symmetrization of asymmetric systematic uncertainties.
//!
//! Given signed percentage deviations `high` (parameter varied up) and `low`
//! (parameter varied down, usually negative), we use the D'Agostini prescription:
//!
//! ```text
//! delta = (high + low) / 2
//! avg   = (high - low) / 2
//! sigma = sqrt(avg^2 + 2 delta^2)
//! ```
//!
//! `sigma` is stored as a symmetric multiplicative uncertainty and `delta` is the
//! percentage shift absorbed into the central value.

/// Result of symmetrizing one asymmetric pair (both in percent).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Symmetrized {
    pub sigma: f64,
    pub delta: f64,
}

pub fn symmetrize(high: f64, low: f64) -> Symmetrized {
    let delta = (high + low) / 2.0;
    let avg = (high - low) / 2.0;
    Symmetrized {
        sigma: (avg * avg + 2.0 * delta * delta).sqrt(),
        delta,
    }
}
