//! Convergence evaluation for the optimizer loop.
//!
//! Convergence is judged on two force norms, and both ceilings must be
//! satisfied simultaneously:
//!
//! - `max_force`: largest absolute component of the force vector
//! - `rms_force`: root-mean-square over all components
//!
//! A geometry with a small maximum force but a broad tail of medium forces is
//! not converged, and neither is one with small average forces hiding a
//! single large component.

use nalgebra::DVector;

/// Result of a convergence check for one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceReport {
    /// Whether both force criteria are satisfied.
    pub converged: bool,
    /// Largest absolute force component.
    pub max_force: f64,
    /// Root-mean-square force.
    pub rms_force: f64,
}

/// Largest absolute component of `forces`.
pub fn max_force(forces: &DVector<f64>) -> f64 {
    forces.iter().map(|f| f.abs()).fold(0.0, f64::max)
}

/// Quadratic mean of the components of `forces`.
pub fn rms_force(forces: &DVector<f64>) -> f64 {
    if forces.is_empty() {
        return 0.0;
    }
    (forces.iter().map(|f| f * f).sum::<f64>() / forces.len() as f64).sqrt()
}

/// Evaluate both force criteria against the given ceilings.
///
/// The first cycle is evaluated exactly like any later one; there is no
/// special-casing for an empty history.
pub fn check_convergence(
    forces: &DVector<f64>,
    max_force_thresh: f64,
    rms_force_thresh: f64,
) -> ConvergenceReport {
    let max_force = max_force(forces);
    let rms_force = rms_force(forces);
    ConvergenceReport {
        converged: max_force <= max_force_thresh && rms_force <= rms_force_thresh,
        max_force,
        rms_force,
    }
}
