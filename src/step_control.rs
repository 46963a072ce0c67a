//! Step-size control: max-step scaling and the backtracking controller.
//!
//! Two independent mechanisms bound how far a single cycle may move the
//! coordinates:
//!
//! 1. [`scale_by_max_step`] clamps a proposed step so no component exceeds the
//!    configured bound. The whole vector is rescaled uniformly, since a
//!    per-component clamp would bend the step away from the direction the
//!    step algorithm chose.
//! 2. [`Backtracker`] adapts a step-scale parameter `alpha` cycle to cycle
//!    from the trend of the two most recent RMS forces. It throttles on
//!    divergence signals and periodically attempts to accelerate, with a
//!    cool-down counter providing hysteresis against thrashing. This is a
//!    trust-region-like heuristic without an explicit trust radius.

use crate::config::OptSettings;
use nalgebra::DVector;

/// Denominators below this are treated as "no significant RMS change".
const RMS_DENOM_FLOOR: f64 = 1e-12;

/// Uniformly rescale `step` so that its largest absolute component does not
/// exceed `max_step`. Steps already within the bound are returned unchanged.
pub fn scale_by_max_step(step: DVector<f64>, max_step: f64) -> DVector<f64> {
    let step_max = step.iter().map(|s| s.abs()).fold(0.0, f64::max);
    if step_max > max_step {
        step * (max_step / step_max)
    } else {
        step
    }
}

/// Accelerated backtracking line-search state.
///
/// `alpha` starts at `alpha0` and is the scale factor step algorithms such as
/// steepest descent multiply the gradient by. After every cycle with at least
/// two RMS-force history entries, [`backtrack`](Backtracker::backtrack)
/// adjusts it:
///
/// - RMS force grew noticeably: shrink `alpha` by `scale_factor`, signal the
///   caller to withdraw the current step, restart the cool-down window.
/// - otherwise: run down the cool-down counter; once it underflows, either
///   reset `alpha` back to `alpha0` (if it drifted above the reference, a
///   signed comparison) or accelerate by dividing by `scale_factor`.
#[derive(Debug, Clone)]
pub struct Backtracker {
    alpha: f64,
    cycles_since_backtrack: i32,
    epsilon: f64,
    alpha0: f64,
    scale_factor: f64,
    force_backtrack_in: i32,
}

impl Backtracker {
    /// Controller initialized from the backtracking-related settings.
    pub fn new(settings: &OptSettings) -> Self {
        Self {
            alpha: settings.alpha0,
            cycles_since_backtrack: settings.force_backtrack_in,
            epsilon: settings.epsilon,
            alpha0: settings.alpha0,
            scale_factor: settings.scale_factor,
            force_backtrack_in: settings.force_backtrack_in,
        }
    }

    /// Current step-scale parameter.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Adjust `alpha` from the previous and current RMS force and return
    /// whether the caller should treat the current cycle's step as withdrawn.
    ///
    /// Callers must only invoke this once two RMS-force history entries
    /// exist; the driver guarantees this by skipping the call on the first
    /// cycle.
    pub fn backtrack(&mut self, prev_rms: f64, cur_rms: f64) -> bool {
        let denom = (cur_rms + prev_rms).abs();
        // Near-zero denominator means both RMS forces have essentially
        // vanished; treat as "no significant change" instead of dividing.
        let rms_diff = if denom < RMS_DENOM_FLOOR {
            0.0
        } else {
            (cur_rms - prev_rms) / denom
        };

        let mut skip = false;
        if rms_diff > self.epsilon {
            // Forces got worse: slow down.
            self.alpha *= self.scale_factor;
            skip = true;
            self.cycles_since_backtrack = self.force_backtrack_in;
        } else {
            self.cycles_since_backtrack -= 1;
            if self.cycles_since_backtrack < 0 {
                self.cycles_since_backtrack = self.force_backtrack_in;
                if self.alpha > self.alpha0 {
                    // Signed comparison: alpha drifted above the reference.
                    self.alpha = self.alpha0;
                    skip = true;
                } else {
                    // alpha is negative; dividing by a fraction grows its
                    // magnitude, i.e. accelerates.
                    self.alpha /= self.scale_factor;
                }
            }
        }
        skip
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backtracker() -> Backtracker {
        Backtracker::new(&OptSettings::default())
    }

    #[test]
    fn test_scale_leaves_small_steps_unchanged() {
        let step = DVector::from_vec(vec![0.01, -0.02, 0.03]);
        let scaled = scale_by_max_step(step.clone(), 0.04);
        assert_eq!(scaled, step);
    }

    #[test]
    fn test_scale_is_uniform_and_direction_preserving() {
        let step = DVector::from_vec(vec![0.08, 0.02, -0.04]);
        let scaled = scale_by_max_step(step, 0.04);
        // Max component 0.08 against bound 0.04: everything halves.
        assert!((scaled[0] - 0.04).abs() < 1e-15);
        assert!((scaled[1] - 0.01).abs() < 1e-15);
        assert!((scaled[2] + 0.02).abs() < 1e-15);
        // Component ratios survive the rescale.
        assert!((scaled[0] / scaled[1] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_scale_uses_absolute_components() {
        let step = DVector::from_vec(vec![-0.08, 0.01]);
        let scaled = scale_by_max_step(step, 0.04);
        assert!((scaled[0] + 0.04).abs() < 1e-15);
    }

    #[test]
    fn test_worsening_rms_shrinks_alpha_and_skips() {
        let mut bt = backtracker();
        // rms_diff = (0.02 - 0.01) / 0.03 = 0.333 > epsilon
        let skip = bt.backtrack(0.01, 0.02);
        assert!(skip);
        assert!((bt.alpha() + 0.025).abs() < 1e-15, "alpha halves from -0.05");
        assert_eq!(bt.cycles_since_backtrack, 3);
    }

    #[test]
    fn test_improving_cycles_fire_acceleration_once_per_window() {
        let mut bt = backtracker();
        // Three improving cycles run the counter 3 -> 0 without action.
        for _ in 0..3 {
            let skip = bt.backtrack(0.02, 0.01);
            assert!(!skip);
            assert_eq!(bt.alpha(), -0.05);
        }
        // Fourth improving cycle underflows the counter. alpha == alpha0, so
        // acceleration fires: -0.05 / 0.5 = -0.1, no skip.
        let skip = bt.backtrack(0.02, 0.01);
        assert!(!skip);
        assert!((bt.alpha() + 0.1).abs() < 1e-15);
        // Window restarted: the very next improving cycle takes no action.
        let skip = bt.backtrack(0.02, 0.01);
        assert!(!skip);
        assert!((bt.alpha() + 0.1).abs() < 1e-15);
    }

    #[test]
    fn test_alpha_above_reference_is_reset_with_skip() {
        let mut bt = backtracker();
        // Two shrinks lift alpha above alpha0 on the signed axis:
        // -0.05 -> -0.025 -> -0.0125.
        bt.backtrack(0.01, 0.02);
        bt.backtrack(0.02, 0.04);
        assert!(bt.alpha() > -0.05);
        // Run the cool-down window down with improving cycles.
        for _ in 0..3 {
            assert!(!bt.backtrack(0.02, 0.01));
        }
        // Counter underflow with alpha > alpha0: reset, skip.
        let skip = bt.backtrack(0.02, 0.01);
        assert!(skip);
        assert_eq!(bt.alpha(), -0.05);
    }

    #[test]
    fn test_vanishing_rms_forces_take_the_quiet_branch() {
        let mut bt = backtracker();
        // Both RMS values zero: the guarded trend is 0, no shrink.
        let skip = bt.backtrack(0.0, 0.0);
        assert!(!skip);
        assert_eq!(bt.alpha(), -0.05);
    }

    #[test]
    fn test_flat_trend_does_not_backtrack() {
        let mut bt = backtracker();
        let skip = bt.backtrack(0.01, 0.01);
        assert!(!skip);
        assert_eq!(bt.alpha(), -0.05);
    }
}
