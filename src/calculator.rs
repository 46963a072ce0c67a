//! Energy and force evaluators.
//!
//! The optimizer core never computes energies itself; it pulls forces from a
//! [`Calculator`] attached to a target. This module defines that seam together
//! with two analytic test potentials:
//!
//! - [`AnaPot`]: a quartic 2D model surface with two minima separated by a
//!   saddle point, the standard workbench for chain-of-states methods
//! - [`Harmonic`]: an isotropic well centered at the origin
//!
//! Real quantum-chemistry backends plug in behind the same trait; from the
//! optimizer's point of view a force evaluation is an opaque, possibly
//! expensive and possibly failing call.
//!
//! # Units and conventions
//!
//! Coordinates are flat vectors `[x1, y1, z1, x2, y2, z2, ...]`. Forces are
//! the negative energy gradient in the same layout:
//! ```text
//! F = -∇E
//! ```

use nalgebra::DVector;
use thiserror::Error;

/// Errors produced by force/energy evaluation.
#[derive(Error, Debug)]
pub enum CalcError {
    /// The evaluator rejected the coordinate vector (wrong dimension, NaN, ...).
    #[error("invalid coordinates: {0}")]
    InvalidCoords(String),
    /// The underlying evaluation failed (e.g. an external program or an
    /// unconverged electronic-structure calculation).
    #[error("evaluation failed: {0}")]
    Evaluation(String),
}

/// A source of energies and forces for a set of coordinates.
///
/// Implementations must be pure functions of the coordinate vector: calling
/// [`forces`](Calculator::forces) twice with the same coordinates returns the
/// same result. Memoization is owned by the target, not the calculator.
pub trait Calculator {
    /// Potential energy at `coords`.
    fn energy(&self, coords: &DVector<f64>) -> Result<f64, CalcError>;

    /// Forces (negative gradient) at `coords`, same dimension as `coords`.
    fn forces(&self, coords: &DVector<f64>) -> Result<DVector<f64>, CalcError>;
}

/// Analytic 2D test potential with two minima and one first-order saddle.
///
/// ```text
/// V(x, y) = 4 + 4.5x - 4y + x^2 + 2y^2 - 2xy + x^4 - 2x^2 y
/// ```
///
/// The z component of every atom is ignored and receives zero force, so a
/// single dummy atom with coordinates `(x, y, 0)` probes the surface. The two
/// minima sit near (-1.053, 1.028) and (1.941, 3.854).
#[derive(Debug, Clone, Default)]
pub struct AnaPot;

impl AnaPot {
    /// Create a new instance of the test potential.
    pub fn new() -> Self {
        Self
    }

    fn check(coords: &DVector<f64>) -> Result<(), CalcError> {
        if coords.len() % 3 != 0 || coords.is_empty() {
            return Err(CalcError::InvalidCoords(format!(
                "expected 3N coordinates, got {}",
                coords.len()
            )));
        }
        Ok(())
    }
}

impl Calculator for AnaPot {
    fn energy(&self, coords: &DVector<f64>) -> Result<f64, CalcError> {
        Self::check(coords)?;
        let mut energy = 0.0;
        for atom in 0..coords.len() / 3 {
            let x = coords[atom * 3];
            let y = coords[atom * 3 + 1];
            energy += 4.0 + 4.5 * x - 4.0 * y + x * x + 2.0 * y * y - 2.0 * x * y
                + x.powi(4)
                - 2.0 * x * x * y;
        }
        Ok(energy)
    }

    fn forces(&self, coords: &DVector<f64>) -> Result<DVector<f64>, CalcError> {
        Self::check(coords)?;
        let mut forces = DVector::zeros(coords.len());
        for atom in 0..coords.len() / 3 {
            let x = coords[atom * 3];
            let y = coords[atom * 3 + 1];
            let dvdx = 4.5 + 2.0 * x - 2.0 * y + 4.0 * x.powi(3) - 4.0 * x * y;
            let dvdy = -4.0 + 4.0 * y - 2.0 * x - 2.0 * x * x;
            forces[atom * 3] = -dvdx;
            forces[atom * 3 + 1] = -dvdy;
        }
        Ok(forces)
    }
}

/// Isotropic harmonic well `V = k/2 |r - r0|^2` centered at `center`.
///
/// Forces drive every coordinate linearly toward the center, which makes
/// convergence behavior exactly predictable in tests.
#[derive(Debug, Clone)]
pub struct Harmonic {
    /// Force constant in energy per length squared.
    pub k: f64,
    /// Center of the well, flat layout matching the coordinates.
    pub center: DVector<f64>,
}

impl Harmonic {
    /// Well with force constant `k` centered at `center`.
    pub fn new(k: f64, center: DVector<f64>) -> Self {
        Self { k, center }
    }
}

impl Calculator for Harmonic {
    fn energy(&self, coords: &DVector<f64>) -> Result<f64, CalcError> {
        if coords.len() != self.center.len() {
            return Err(CalcError::InvalidCoords(format!(
                "expected {} coordinates, got {}",
                self.center.len(),
                coords.len()
            )));
        }
        let displacement = coords - &self.center;
        Ok(0.5 * self.k * displacement.norm_squared())
    }

    fn forces(&self, coords: &DVector<f64>) -> Result<DVector<f64>, CalcError> {
        if coords.len() != self.center.len() {
            return Err(CalcError::InvalidCoords(format!(
                "expected {} coordinates, got {}",
                self.center.len(),
                coords.len()
            )));
        }
        Ok((&self.center - coords) * self.k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numerical_forces(calc: &dyn Calculator, coords: &DVector<f64>) -> DVector<f64> {
        let delta = 1e-6;
        let mut forces = DVector::zeros(coords.len());
        for i in 0..coords.len() {
            let mut plus = coords.clone();
            plus[i] += delta;
            let mut minus = coords.clone();
            minus[i] -= delta;
            let e_plus = calc.energy(&plus).unwrap();
            let e_minus = calc.energy(&minus).unwrap();
            forces[i] = -(e_plus - e_minus) / (2.0 * delta);
        }
        forces
    }

    #[test]
    fn test_anapot_forces_match_numerical_gradient() {
        let calc = AnaPot::new();
        let coords = DVector::from_vec(vec![0.3, 1.7, 0.0]);
        let analytic = calc.forces(&coords).unwrap();
        let numerical = numerical_forces(&calc, &coords);
        assert!((analytic - numerical).norm() < 1e-6);
    }

    #[test]
    fn test_anapot_minimum_has_small_forces() {
        let calc = AnaPot::new();
        let coords = DVector::from_vec(vec![-1.05274, 1.02776, 0.0]);
        let forces = calc.forces(&coords).unwrap();
        assert!(forces.norm() < 1e-3, "forces at minimum: {}", forces.norm());
    }

    #[test]
    fn test_anapot_rejects_bad_dimension() {
        let calc = AnaPot::new();
        let coords = DVector::from_vec(vec![1.0, 2.0]);
        assert!(calc.forces(&coords).is_err());
        assert!(calc.energy(&coords).is_err());
    }

    #[test]
    fn test_harmonic_forces_point_to_center() {
        let center = DVector::from_vec(vec![0.0, 0.0, 0.0]);
        let calc = Harmonic::new(2.0, center);
        let coords = DVector::from_vec(vec![1.0, -2.0, 0.5]);
        let forces = calc.forces(&coords).unwrap();
        assert_eq!(forces, DVector::from_vec(vec![-2.0, 4.0, -1.0]));
        let energy = calc.energy(&coords).unwrap();
        assert!((energy - 0.5 * 2.0 * 5.25).abs() < 1e-12);
    }
}
