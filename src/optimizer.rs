//! The iterative optimizer loop.
//!
//! This module ties the convergence evaluator, the step scaler and a
//! pluggable step algorithm into the driver state machine that advances a
//! [`Target`] toward a stationary point:
//!
//! ```text
//! Running -> Converged           (both force criteria satisfied)
//! Running -> MaxCyclesReached    (cycle budget exhausted)
//! ```
//!
//! Each cycle pulls the current forces from the target, records them in the
//! append-only [`History`], checks convergence, asks the [`StepAlgorithm`]
//! for a raw step, clamps it with
//! [`scale_by_max_step`](crate::step_control::scale_by_max_step), optionally
//! reparameterizes the proposed coordinates (chain-of-states image
//! redistribution) and commits them back to the target. The loop is fully
//! synchronous and owns its history and step-control state exclusively; the
//! target must not be mutated by anyone else for the duration of a run.
//!
//! Reaching the cycle budget is not an error: [`Optimizer::run`] returns an
//! [`OptOutcome`] either way, so callers can inspect the history of an
//! incomplete optimization just like that of a successful one.

use crate::calculator::CalcError;
use crate::config::{OptSettings, SettingsError};
use crate::convergence::check_convergence;
use crate::step_control::{scale_by_max_step, Backtracker};
use log::info;
use nalgebra::DVector;
use thiserror::Error;

/// Errors the optimizer loop can surface.
#[derive(Error, Debug)]
pub enum OptError {
    /// Invalid configuration, rejected at construction.
    #[error("configuration error: {0}")]
    Settings(#[from] SettingsError),
    /// A force evaluation failed mid-run.
    #[error(transparent)]
    Calc(#[from] CalcError),
}

/// Anything the optimizer can advance: a single geometry or a chain of
/// coupled images.
///
/// Implementations own the memoization of `forces`: a read must reflect the
/// most recently set coordinates, and repeated reads between coordinate
/// updates must not re-trigger evaluation. For a chain-of-states target,
/// `coords` and `forces` are flattened concatenations over all images and
/// `forces` already includes the inter-image coupling; the loop has no
/// chain-specific logic.
pub trait Target {
    /// Current coordinates as a flat vector.
    fn coords(&self) -> DVector<f64>;
    /// Commit new coordinates, invalidating cached forces.
    fn set_coords(&mut self, coords: DVector<f64>);
    /// Forces corresponding to the current coordinates, evaluated lazily.
    fn forces(&mut self) -> Result<DVector<f64>, CalcError>;
}

/// Strategy supplying the raw (unclamped) step for one cycle.
///
/// Implementations receive the current forces and the full history recorded
/// so far, which is how the steepest-descent family reaches the RMS-force
/// trend its backtracking controller feeds on.
pub trait StepAlgorithm {
    /// Propose a step vector with the same dimension as the forces.
    fn propose_step(&mut self, forces: &DVector<f64>, history: &History) -> DVector<f64>;
}

/// Append-only per-cycle record of the optimization.
///
/// One entry per completed cycle, indexed by cycle number. Never mutated in
/// place; cleared only by constructing a new [`Optimizer`].
#[derive(Debug, Clone, Default)]
pub struct History {
    /// Coordinate snapshot at the start of each cycle.
    pub coords: Vec<DVector<f64>>,
    /// Forces pulled at the start of each cycle.
    pub forces: Vec<DVector<f64>>,
    /// Clamped step committed in each non-terminal cycle.
    pub steps: Vec<DVector<f64>>,
    /// Largest absolute force component per cycle.
    pub max_forces: Vec<f64>,
    /// Root-mean-square force per cycle.
    pub rms_forces: Vec<f64>,
}

impl History {
    /// Create an empty history with room for `max_cycles` entries, so the
    /// per-cycle pushes never reallocate.
    pub fn with_capacity(max_cycles: usize) -> Self {
        Self {
            coords: Vec::with_capacity(max_cycles),
            forces: Vec::with_capacity(max_cycles),
            steps: Vec::with_capacity(max_cycles),
            max_forces: Vec::with_capacity(max_cycles),
            rms_forces: Vec::with_capacity(max_cycles),
        }
    }
}

/// Terminal state of an optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptOutcome {
    /// Both force criteria were satisfied.
    Converged,
    /// The cycle budget ran out first.
    MaxCyclesReached,
}

impl OptOutcome {
    /// Whether the run ended in convergence.
    pub fn converged(&self) -> bool {
        matches!(self, OptOutcome::Converged)
    }
}

/// The optimizer driver.
///
/// Owns the settings, the step algorithm and the run history. A single
/// instance drives a single target; constructing a new instance is the only
/// way to reset the history.
pub struct Optimizer {
    settings: OptSettings,
    step_algorithm: Box<dyn StepAlgorithm>,
    cur_cycle: usize,
    converged: bool,
    history: History,
}

impl Optimizer {
    /// Create a driver from validated settings and a step algorithm.
    ///
    /// Settings are validated here so that an invalid configuration fails
    /// before the first (possibly expensive) force evaluation.
    pub fn new(
        settings: OptSettings,
        step_algorithm: Box<dyn StepAlgorithm>,
    ) -> Result<Self, OptError> {
        settings.validate()?;
        let history = History::with_capacity(settings.max_cycles);
        Ok(Self {
            settings,
            step_algorithm,
            cur_cycle: 0,
            converged: false,
            history,
        })
    }

    /// Cycle index: the cycle on which convergence was detected, or the
    /// number of completed cycles if the run did not converge.
    pub fn cur_cycle(&self) -> usize {
        self.cur_cycle
    }

    /// Whether a previous run ended in convergence.
    pub fn is_converged(&self) -> bool {
        self.converged
    }

    /// Per-cycle history of the run.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Run the loop to a terminal state without a reparameterization hook.
    pub fn run(&mut self, target: &mut dyn Target) -> Result<OptOutcome, OptError> {
        self.run_with_reparam(target, None)
    }

    /// Run the loop to a terminal state.
    ///
    /// When `reparam` is supplied it is applied to every proposed
    /// new-coordinate set right before the commit, never to the initial
    /// coordinates. Chain-of-states targets use this to redistribute image
    /// spacing each cycle.
    pub fn run_with_reparam(
        &mut self,
        target: &mut dyn Target,
        mut reparam: Option<&mut dyn FnMut(DVector<f64>) -> DVector<f64>>,
    ) -> Result<OptOutcome, OptError> {
        while self.cur_cycle < self.settings.max_cycles {
            let forces = target.forces()?;
            self.history.coords.push(target.coords());
            self.history.forces.push(forces.clone());

            let report = check_convergence(
                &forces,
                self.settings.max_force_thresh,
                self.settings.rms_force_thresh,
            );
            self.history.max_forces.push(report.max_force);
            self.history.rms_forces.push(report.rms_force);
            info!(
                "cycle: {:04} max(force): {:.5} rms(force): {:.5}",
                self.cur_cycle, report.max_force, report.rms_force
            );

            if report.converged {
                self.converged = true;
                return Ok(OptOutcome::Converged);
            }

            let raw_step = self.step_algorithm.propose_step(&forces, &self.history);
            let step = scale_by_max_step(raw_step, self.settings.max_step);
            self.history.steps.push(step.clone());

            let mut new_coords = target.coords() + step;
            if let Some(reparam) = reparam.as_mut() {
                new_coords = reparam(new_coords);
            }
            target.set_coords(new_coords);

            self.cur_cycle += 1;
        }
        Ok(OptOutcome::MaxCyclesReached)
    }
}

/// Steepest descent with accelerated backtracking.
///
/// The raw step follows the forces, scaled by the controller's `alpha`
/// (negative by convention, applied to the gradient):
///
/// ```text
/// step = alpha * g = -alpha * F
/// ```
///
/// When the controller signals a backtrack, the withdrawn step is simply
/// recomputed with the already-shrunk `alpha`, so a divergent cycle is
/// immediately retried with a shorter step.
pub struct SteepestDescent {
    backtracker: Backtracker,
}

impl SteepestDescent {
    /// Steepest descent configured from the backtracking settings.
    pub fn new(settings: &OptSettings) -> Self {
        Self {
            backtracker: Backtracker::new(settings),
        }
    }
}

impl StepAlgorithm for SteepestDescent {
    fn propose_step(&mut self, forces: &DVector<f64>, history: &History) -> DVector<f64> {
        let n = history.rms_forces.len();
        if n >= 2 {
            self.backtracker
                .backtrack(history.rms_forces[n - 2], history.rms_forces[n - 1]);
        }
        forces * (-self.backtracker.alpha())
    }
}
