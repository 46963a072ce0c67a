//! Chain-of-states targets for reaction-path optimization.
//!
//! A [`ChainOfStates`] holds an ordered sequence of geometry images spanning
//! a path between two structures and presents them to the optimizer as a
//! single [`Target`]: coordinates and forces are flattened concatenations
//! over all images, and the per-image forces already include the nudged
//! elastic band (NEB) coupling, so the driver loop needs no chain-specific
//! logic.
//!
//! # Coupling forces
//!
//! For an interior image `i` with true force `F_i` and normalized path
//! tangent `τ̂_i = (R_{i+1} - R_{i-1}) / |R_{i+1} - R_{i-1}|`:
//!
//! ```text
//! F_i^⊥      = F_i - (F_i · τ̂_i) τ̂_i
//! F_i^spring = k (|R_{i+1} - R_i| - |R_i - R_{i-1}|) τ̂_i
//! F_i^NEB    = F_i^⊥ + F_i^spring
//! ```
//!
//! The perpendicular projection keeps true forces from fighting the spring
//! spacing; the spring force acts only along the tangent and keeps images
//! from sliding into the basins at the ends of the path.
//!
//! # Frozen endpoints
//!
//! With `fix_ends` the first and last image report zero force and ignore
//! coordinate updates. They still occupy their slots in the flattened
//! vectors, so image ordering and dimensionality stay fixed for the life of
//! the chain.
//!
//! # References
//!
//! - Henkelman, G.; Jónsson, H. *J. Chem. Phys.* **2000**, 113, 9978-9985.

use crate::calculator::CalcError;
use crate::geometry::Geometry;
use crate::optimizer::Target;
use nalgebra::DVector;

/// Tangent and arc-length segments below this are treated as degenerate.
const TINY_NORM: f64 = 1e-12;

/// An ordered sequence of coupled geometry images optimized jointly.
pub struct ChainOfStates {
    images: Vec<Geometry>,
    k: f64,
    fix_ends: bool,
    coords_per_image: usize,
    forces_cache: Option<DVector<f64>>,
}

impl ChainOfStates {
    /// Build a chain from at least two images with identical coordinate
    /// dimensions.
    ///
    /// `k` is the spring constant of the inter-image coupling; `fix_ends`
    /// freezes the first and last image.
    ///
    /// # Panics
    ///
    /// Panics on fewer than two images or mismatched image dimensions.
    pub fn new(images: Vec<Geometry>, k: f64, fix_ends: bool) -> Self {
        assert!(images.len() >= 2, "a chain needs at least two images");
        let coords_per_image = images[0].coords().len();
        assert!(
            images.iter().all(|img| img.coords().len() == coords_per_image),
            "all images must share one coordinate dimension"
        );
        Self {
            images,
            k,
            fix_ends,
            coords_per_image,
            forces_cache: None,
        }
    }

    /// Number of images in the chain.
    pub fn num_images(&self) -> usize {
        self.images.len()
    }

    /// Coordinate count of a single image.
    pub fn coords_per_image(&self) -> usize {
        self.coords_per_image
    }

    /// Coordinates of one image.
    pub fn image_coords(&self, idx: usize) -> DVector<f64> {
        self.images[idx].coords()
    }

    /// Energies of all images in order, evaluated lazily per image.
    pub fn energies(&mut self) -> Result<Vec<f64>, CalcError> {
        self.images.iter_mut().map(|img| img.energy()).collect()
    }

    /// Reparameterization closure redistributing images to equal spacing,
    /// suitable for
    /// [`Optimizer::run_with_reparam`](crate::optimizer::Optimizer::run_with_reparam).
    pub fn reparam_equal(&self) -> impl FnMut(DVector<f64>) -> DVector<f64> {
        let num_images = self.images.len();
        move |coords| equal_spacing(coords, num_images)
    }

    fn is_frozen(&self, idx: usize) -> bool {
        self.fix_ends && (idx == 0 || idx == self.images.len() - 1)
    }

    fn compute_forces(&mut self) -> Result<DVector<f64>, CalcError> {
        let num_images = self.images.len();
        let dim = self.coords_per_image;

        let mut true_forces = Vec::with_capacity(num_images);
        for img in &mut self.images {
            true_forces.push(img.forces()?);
        }
        let coords: Vec<DVector<f64>> =
            self.images.iter().map(|img| img.coords()).collect();

        let mut total = DVector::zeros(num_images * dim);
        for i in 0..num_images {
            if self.is_frozen(i) {
                continue;
            }
            let image_force = if i == 0 || i == num_images - 1 {
                // Free endpoints feel only their true force.
                true_forces[i].clone()
            } else {
                let tangent_raw = &coords[i + 1] - &coords[i - 1];
                let tangent_norm = tangent_raw.norm();
                if tangent_norm < TINY_NORM {
                    true_forces[i].clone()
                } else {
                    let tangent = tangent_raw / tangent_norm;
                    let parallel = true_forces[i].dot(&tangent);
                    let perpendicular = &true_forces[i] - &tangent * parallel;
                    let ahead = (&coords[i + 1] - &coords[i]).norm();
                    let behind = (&coords[i] - &coords[i - 1]).norm();
                    let spring = self.k * (ahead - behind);
                    perpendicular + tangent * spring
                }
            };
            total.rows_mut(i * dim, dim).copy_from(&image_force);
        }
        Ok(total)
    }
}

impl Target for ChainOfStates {
    fn coords(&self) -> DVector<f64> {
        let dim = self.coords_per_image;
        let mut flat = DVector::zeros(self.images.len() * dim);
        for (i, img) in self.images.iter().enumerate() {
            flat.rows_mut(i * dim, dim).copy_from(&img.coords());
        }
        flat
    }

    fn set_coords(&mut self, coords: DVector<f64>) {
        let dim = self.coords_per_image;
        assert_eq!(
            coords.len(),
            self.images.len() * dim,
            "chain coordinate dimension is fixed"
        );
        for i in 0..self.images.len() {
            if self.is_frozen(i) {
                continue;
            }
            let image_coords = coords.rows(i * dim, dim).clone_owned();
            self.images[i].set_coords(image_coords);
        }
        self.forces_cache = None;
    }

    fn forces(&mut self) -> Result<DVector<f64>, CalcError> {
        if let Some(forces) = &self.forces_cache {
            return Ok(forces.clone());
        }
        let forces = self.compute_forces()?;
        self.forces_cache = Some(forces.clone());
        Ok(forces)
    }
}

/// Redistribute a flattened chain-coordinate vector so images sit at equal
/// arc length along the piecewise-linear path. Endpoints stay in place.
///
/// Degenerate paths (total length near zero) are returned unchanged.
pub fn equal_spacing(coords: DVector<f64>, num_images: usize) -> DVector<f64> {
    assert!(num_images >= 2, "a chain needs at least two images");
    assert_eq!(coords.len() % num_images, 0, "uneven chain coordinate vector");
    let dim = coords.len() / num_images;

    let points: Vec<DVector<f64>> = (0..num_images)
        .map(|i| coords.rows(i * dim, dim).clone_owned())
        .collect();

    // Cumulative arc length along the current path.
    let mut cumulative = vec![0.0; num_images];
    for i in 1..num_images {
        cumulative[i] = cumulative[i - 1] + (&points[i] - &points[i - 1]).norm();
    }
    let total = cumulative[num_images - 1];
    if total < TINY_NORM {
        return coords;
    }

    let mut redistributed = coords.clone();
    for j in 1..num_images - 1 {
        let target_len = total * j as f64 / (num_images - 1) as f64;
        // Find the segment containing the target arc length.
        let mut seg = 0;
        while seg + 2 < num_images && cumulative[seg + 1] < target_len {
            seg += 1;
        }
        let seg_len = cumulative[seg + 1] - cumulative[seg];
        let fraction = if seg_len < TINY_NORM {
            0.0
        } else {
            (target_len - cumulative[seg]) / seg_len
        };
        let point = &points[seg] + (&points[seg + 1] - &points[seg]) * fraction;
        redistributed.rows_mut(j * dim, dim).copy_from(&point);
    }
    redistributed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::Harmonic;

    fn image_at(x: f64) -> Geometry {
        Geometry::new(
            vec!["H".to_string()],
            vec![x, 0.0, 0.0],
            Box::new(Harmonic::new(1.0, DVector::zeros(3))),
        )
    }

    fn chain_at(xs: &[f64], k: f64, fix_ends: bool) -> ChainOfStates {
        ChainOfStates::new(xs.iter().map(|&x| image_at(x)).collect(), k, fix_ends)
    }

    #[test]
    fn test_coords_flatten_in_image_order() {
        let chain = chain_at(&[1.0, 2.0, 4.0], 0.1, true);
        let coords = chain.coords();
        assert_eq!(coords.len(), 9);
        assert_eq!(coords[0], 1.0);
        assert_eq!(coords[3], 2.0);
        assert_eq!(coords[6], 4.0);
    }

    #[test]
    fn test_frozen_ends_ignore_coordinate_updates() {
        let mut chain = chain_at(&[0.0, 1.0, 2.0], 0.1, true);
        let mut new_coords = chain.coords();
        for i in 0..new_coords.len() {
            new_coords[i] += 10.0;
        }
        chain.set_coords(new_coords);
        assert_eq!(chain.image_coords(0)[0], 0.0);
        assert_eq!(chain.image_coords(1)[0], 11.0);
        assert_eq!(chain.image_coords(2)[0], 2.0);
    }

    #[test]
    fn test_frozen_ends_report_zero_force() {
        let mut chain = chain_at(&[1.0, 2.0, 4.0], 0.5, true);
        let forces = chain.forces().unwrap();
        assert_eq!(forces.rows(0, 3).norm(), 0.0);
        assert_eq!(forces.rows(6, 3).norm(), 0.0);
    }

    #[test]
    fn test_interior_force_is_spring_along_tangent_when_true_force_parallel() {
        // Images on the x axis at 1, 2, 4 in a harmonic well centered at the
        // origin: the true force on the middle image (-2 along x) is purely
        // parallel to the tangent, so the perpendicular part vanishes and
        // only the spring term k * (|4-2| - |2-1|) = k survives.
        let mut chain = chain_at(&[1.0, 2.0, 4.0], 0.5, true);
        let forces = chain.forces().unwrap();
        let middle = forces.rows(3, 3).clone_owned();
        assert!((middle[0] - 0.5).abs() < 1e-12);
        assert!(middle[1].abs() < 1e-12);
        assert!(middle[2].abs() < 1e-12);
    }

    #[test]
    fn test_perpendicular_true_force_survives_projection() {
        // Middle image displaced off the x axis: the y component of its true
        // force is perpendicular to the (x-axis) tangent and must survive.
        let images = vec![image_at(0.0), {
            Geometry::new(
                vec!["H".to_string()],
                vec![1.0, 0.5, 0.0],
                Box::new(Harmonic::new(1.0, DVector::zeros(3))),
            )
        }, image_at(2.0)];
        let mut chain = ChainOfStates::new(images, 0.1, true);
        let forces = chain.forces().unwrap();
        let middle = forces.rows(3, 3).clone_owned();
        assert!((middle[1] + 0.5).abs() < 1e-12, "true -0.5 y-force kept");
    }

    #[test]
    fn test_forces_cache_invalidated_by_set_coords() {
        let mut chain = chain_at(&[1.0, 2.0, 4.0], 0.5, true);
        let first = chain.forces().unwrap();
        let mut coords = chain.coords();
        coords[3] = 3.0; // move middle image
        chain.set_coords(coords);
        let second = chain.forces().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_equal_spacing_redistributes_interior_images() {
        // 1D path 0 -> 0.2 -> 1 becomes 0 -> 0.5 -> 1.
        let coords = DVector::from_vec(vec![
            0.0, 0.0, 0.0, //
            0.2, 0.0, 0.0, //
            1.0, 0.0, 0.0,
        ]);
        let out = equal_spacing(coords, 3);
        assert!((out[3] - 0.5).abs() < 1e-12);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[6], 1.0);
    }

    #[test]
    fn test_equal_spacing_keeps_degenerate_path() {
        let coords = DVector::zeros(9);
        let out = equal_spacing(coords.clone(), 3);
        assert_eq!(out, coords);
    }

    #[test]
    #[should_panic(expected = "at least two images")]
    fn test_single_image_chain_panics() {
        chain_at(&[0.0], 0.1, true);
    }
}
