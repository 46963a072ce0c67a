//! Molecular geometry as an optimizable target.
//!
//! A [`Geometry`] couples a set of atoms in flat Cartesian coordinates with a
//! [`Calculator`](crate::calculator::Calculator) that knows how to evaluate
//! energies and forces for those coordinates. Forces and energy are recomputed
//! lazily: reading them after a coordinate update triggers exactly one
//! evaluation, and repeated reads are served from the cache. This guarantees
//! the invariant the optimizer loop relies on: forces always correspond to
//! the current coordinates, and the (possibly expensive) evaluation is never
//! run more often than necessary.
//!
//! # Storage format
//!
//! Coordinates are stored as a single `DVector<f64>` in the order
//! `[x1, y1, z1, x2, y2, z2, ...]`, which enables direct use with nalgebra
//! for the vector arithmetic of the optimization step.

use crate::calculator::{CalcError, Calculator};
use crate::optimizer::Target;
use nalgebra::DVector;

/// A molecular structure with element labels, flat Cartesian coordinates and
/// an attached force evaluator.
///
/// # Examples
///
/// ```
/// use nalgebra::DVector;
/// use pathopt::calculator::Harmonic;
/// use pathopt::geometry::Geometry;
/// use pathopt::optimizer::Target;
///
/// let center = DVector::from_vec(vec![0.0, 0.0, 0.0]);
/// let mut geom = Geometry::new(
///     vec!["H".to_string()],
///     vec![1.0, 0.0, 0.0],
///     Box::new(Harmonic::new(1.0, center)),
/// );
/// let forces = geom.forces().unwrap();
/// assert_eq!(forces[0], -1.0);
/// ```
pub struct Geometry {
    /// Chemical element symbols, one per atom, in order.
    pub elements: Vec<String>,
    coords: DVector<f64>,
    calculator: Box<dyn Calculator>,
    forces_cache: Option<DVector<f64>>,
    energy_cache: Option<f64>,
}

impl Geometry {
    /// Create a geometry from element labels, a flat coordinate vector of
    /// length `3 * elements.len()` and a force evaluator.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate vector length does not match the atom count.
    pub fn new(elements: Vec<String>, coords: Vec<f64>, calculator: Box<dyn Calculator>) -> Self {
        assert_eq!(
            coords.len(),
            elements.len() * 3,
            "coordinate vector must hold 3 components per atom"
        );
        Self {
            elements,
            coords: DVector::from_vec(coords),
            calculator,
            forces_cache: None,
            energy_cache: None,
        }
    }

    /// Number of atoms.
    pub fn num_atoms(&self) -> usize {
        self.elements.len()
    }

    /// Cartesian coordinates of a single atom as `[x, y, z]`.
    pub fn atom_coords(&self, atom_idx: usize) -> [f64; 3] {
        let i = atom_idx * 3;
        [self.coords[i], self.coords[i + 1], self.coords[i + 2]]
    }

    /// Potential energy at the current coordinates, evaluated lazily and
    /// memoized until the next coordinate update.
    pub fn energy(&mut self) -> Result<f64, CalcError> {
        if let Some(energy) = self.energy_cache {
            return Ok(energy);
        }
        let energy = self.calculator.energy(&self.coords)?;
        self.energy_cache = Some(energy);
        Ok(energy)
    }
}

impl Target for Geometry {
    fn coords(&self) -> DVector<f64> {
        self.coords.clone()
    }

    fn set_coords(&mut self, coords: DVector<f64>) {
        assert_eq!(
            coords.len(),
            self.coords.len(),
            "coordinate dimension is fixed for the life of a geometry"
        );
        self.coords = coords;
        self.forces_cache = None;
        self.energy_cache = None;
    }

    fn forces(&mut self) -> Result<DVector<f64>, CalcError> {
        if let Some(forces) = &self.forces_cache {
            return Ok(forces.clone());
        }
        let forces = self.calculator.forces(&self.coords)?;
        self.forces_cache = Some(forces.clone());
        Ok(forces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::Harmonic;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Counts force evaluations to verify memoization.
    struct CountingCalc {
        inner: Harmonic,
        calls: Rc<Cell<usize>>,
    }

    impl Calculator for CountingCalc {
        fn energy(&self, coords: &DVector<f64>) -> Result<f64, CalcError> {
            self.inner.energy(coords)
        }

        fn forces(&self, coords: &DVector<f64>) -> Result<DVector<f64>, CalcError> {
            self.calls.set(self.calls.get() + 1);
            self.inner.forces(coords)
        }
    }

    fn harmonic_geom() -> Geometry {
        let center = DVector::from_vec(vec![0.0, 0.0, 0.0]);
        Geometry::new(
            vec!["H".to_string()],
            vec![1.0, 2.0, 0.0],
            Box::new(Harmonic::new(1.0, center)),
        )
    }

    #[test]
    fn test_forces_are_memoized_until_coords_change() {
        let calls = Rc::new(Cell::new(0));
        let calc = CountingCalc {
            inner: Harmonic::new(1.0, DVector::zeros(3)),
            calls: Rc::clone(&calls),
        };
        let mut geom = Geometry::new(
            vec!["H".to_string()],
            vec![1.0, 0.0, 0.0],
            Box::new(calc),
        );

        geom.forces().unwrap();
        geom.forces().unwrap();
        assert_eq!(calls.get(), 1, "second read must hit the cache");

        geom.set_coords(DVector::from_vec(vec![0.5, 0.0, 0.0]));
        geom.forces().unwrap();
        assert_eq!(calls.get(), 2, "coordinate update must invalidate the cache");
    }

    #[test]
    fn test_forces_reflect_current_coords() {
        let mut geom = harmonic_geom();
        let first = geom.forces().unwrap();
        assert_eq!(first, DVector::from_vec(vec![-1.0, -2.0, 0.0]));

        geom.set_coords(DVector::from_vec(vec![0.0, -3.0, 0.0]));
        let second = geom.forces().unwrap();
        assert_eq!(second, DVector::from_vec(vec![0.0, 3.0, 0.0]));
    }

    #[test]
    fn test_energy_tracks_coords() {
        let mut geom = harmonic_geom();
        assert!((geom.energy().unwrap() - 2.5).abs() < 1e-12);
        geom.set_coords(DVector::zeros(3));
        assert!(geom.energy().unwrap().abs() < 1e-12);
    }

    #[test]
    #[should_panic(expected = "3 components per atom")]
    fn test_mismatched_coords_panic() {
        let center = DVector::zeros(3);
        Geometry::new(
            vec!["H".to_string(), "H".to_string()],
            vec![0.0, 0.0, 0.0],
            Box::new(Harmonic::new(1.0, center)),
        );
    }
}
