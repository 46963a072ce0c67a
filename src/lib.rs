#![deny(missing_docs)]

//! pathopt - Iterative Geometry Optimization Core
//!
//! pathopt drives a molecular geometry (or a 2D test-potential probe) toward
//! a stationary point: pull forces from an evaluator, check convergence,
//! take a bounded step, repeat. The same loop, unchanged, also optimizes
//! chain-of-states targets such as nudged elastic band (NEB) paths, because
//! a chain is just another [`Target`](optimizer::Target).
//!
//! # Overview
//!
//! The core pieces, leaves first:
//!
//! - **Convergence evaluator** ([`convergence`]): max/RMS force norms checked
//!   against two ceilings that must both hold.
//! - **Step scaler** ([`step_control::scale_by_max_step`]): uniform rescale
//!   of oversized steps, preserving the step direction.
//! - **Backtracking controller** ([`step_control::Backtracker`]): adaptive
//!   step-scale parameter driven by the RMS-force trend, with a cool-down
//!   window for hysteresis.
//! - **Optimizer loop** ([`optimizer::Optimizer`]): the driver state machine
//!   tying the above together around a pluggable
//!   [`StepAlgorithm`](optimizer::StepAlgorithm).
//! - **Targets**: a single [`Geometry`](geometry::Geometry) or a
//!   [`ChainOfStates`](cos::ChainOfStates) aggregate with NEB coupling
//!   forces.
//!
//! # Quick Start
//!
//! ```
//! use nalgebra::DVector;
//! use pathopt::calculator::AnaPot;
//! use pathopt::config::OptSettings;
//! use pathopt::geometry::Geometry;
//! use pathopt::optimizer::{Optimizer, SteepestDescent};
//!
//! let mut geom = Geometry::new(
//!     vec!["X".to_string()],
//!     vec![-0.7, 1.5, 0.0],
//!     Box::new(AnaPot::new()),
//! );
//!
//! let mut settings = OptSettings::default();
//! settings.max_cycles = 200;
//! let sd = SteepestDescent::new(&settings);
//! let mut opt = Optimizer::new(settings, Box::new(sd)).unwrap();
//!
//! let outcome = opt.run(&mut geom).unwrap();
//! assert!(outcome.converged());
//! ```
//!
//! # Modules
//!
//! - [`calculator`] - energy/force evaluator seam plus analytic test potentials
//! - [`geometry`] - single-geometry target with lazy memoized forces
//! - [`config`] - explicit settings structure with INI loading
//! - [`convergence`] - force-norm convergence evaluation
//! - [`step_control`] - max-step scaling and backtracking
//! - [`optimizer`] - the driver loop and the steepest-descent step algorithm
//! - [`cos`] - chain-of-states (NEB) aggregate target
//!
//! # Scope
//!
//! Quantum-chemistry backends, internal-coordinate machinery, path
//! interpolation and visualization live outside this crate; they meet the
//! core only through the [`Calculator`](calculator::Calculator) and
//! [`Target`](optimizer::Target) contracts.

pub mod calculator;
pub mod config;
pub mod convergence;
pub mod cos;
pub mod geometry;
pub mod optimizer;
pub mod step_control;

pub use config::OptSettings;
pub use geometry::Geometry;
pub use optimizer::{OptOutcome, Optimizer};
