// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Termination policy shared by the iterative procedures.

use serde::Serialize;

use crate::config::ConvergencePolicy;

/// Relative difference below which two errors are considered equal when
/// looking for oscillations.
const OSCILLATION_EPSILON: f64 = 1e-9;

/// Whether an iterative procedure reached its tolerance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceStatus {
    Converged,
    NotConverged,
}

/// Why an iterative procedure stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    WithinTolerance,
    IterationLimit,
    /// The best error did not improve for `patience` iterations.
    Stalled,
    /// The error came back to its value of two iterations before.
    Oscillating,
}

/// Decision taken after observing one iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Stop(StopReason),
}

/// Summary of a finished iterative procedure.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConvergenceReport {
    pub status: ConvergenceStatus,
    pub reason: StopReason,
    pub iterations: usize,
    /// Error of the state that was kept.
    pub final_error: f64,
}

impl ConvergenceReport {
    pub fn converged(&self) -> bool {
        self.status == ConvergenceStatus::Converged
    }
}

/// Tracks the errors of an iterative procedure and decides when it stops.
#[derive(Clone, Debug)]
pub struct ConvergenceController {
    policy: ConvergencePolicy,
    iterations: usize,
    best_error: f64,
    since_best: usize,
    previous: [Option<f64>; 2],
}

impl ConvergenceController {
    pub fn new(policy: ConvergencePolicy) -> Self {
        Self {
            policy,
            iterations: 0,
            best_error: f64::INFINITY,
            since_best: 0,
            previous: [None, None],
        }
    }

    /// Records the error of one more iteration.
    ///
    /// Non-finite errors count as iterations without improvement.
    pub fn observe(&mut self, error: f64) -> Verdict {
        self.iterations += 1;
        let error = if error.is_finite() {
            error.abs()
        } else {
            f64::INFINITY
        };

        if error < self.policy.tolerance {
            self.best_error = error;
            return Verdict::Stop(StopReason::WithinTolerance);
        }

        if error < self.best_error {
            self.best_error = error;
            self.since_best = 0;
        } else {
            self.since_best += 1;
        }

        let [two_back, one_back] = self.previous;
        self.previous = [one_back, Some(error)];

        if let Some(two_back) = two_back {
            if error.is_finite()
                && (error - two_back).abs() <= OSCILLATION_EPSILON * error.max(1.0)
            {
                return Verdict::Stop(StopReason::Oscillating);
            }
        }
        if self.iterations >= self.policy.max_iterations {
            return Verdict::Stop(StopReason::IterationLimit);
        }
        if self.since_best >= self.policy.patience.max(1) {
            return Verdict::Stop(StopReason::Stalled);
        }

        Verdict::Continue
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn best_error(&self) -> f64 {
        self.best_error
    }

    /// Builds the report of a procedure stopped for `reason`.
    pub fn report(&self, reason: StopReason) -> ConvergenceReport {
        ConvergenceReport {
            status: if reason == StopReason::WithinTolerance {
                ConvergenceStatus::Converged
            } else {
                ConvergenceStatus::NotConverged
            },
            reason,
            iterations: self.iterations,
            final_error: self.best_error,
        }
    }
}

/// Drives a fixed-point iteration.
///
/// `step` evaluates a state and returns its error together with the next
/// state to evaluate.  The iteration stops as decided by a
/// [`ConvergenceController`] and returns the state that met the tolerance,
/// or the state with the smallest error when it did not converge.
pub fn run_fixed_point<S, F>(
    policy: &ConvergencePolicy,
    initial: S,
    mut step: F,
) -> (S, ConvergenceReport)
where
    S: Clone,
    F: FnMut(&S) -> (f64, S),
{
    let mut controller = ConvergenceController::new(policy.clone());
    let mut best: Option<(f64, S)> = None;
    let mut state = initial;

    loop {
        let (error, next) = step(&state);
        let verdict = controller.observe(error);

        if let Verdict::Stop(StopReason::WithinTolerance) = verdict {
            return (state, controller.report(StopReason::WithinTolerance));
        }
        if best.as_ref().map_or(true, |(e, _)| error < *e) {
            best = Some((error, state));
        }
        match verdict {
            Verdict::Continue => state = next,
            Verdict::Stop(reason) => {
                let report = controller.report(reason);
                let kept = match best {
                    Some((_, s)) => s,
                    None => next,
                };
                return (kept, report);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(tolerance: f64, max_iterations: usize, patience: usize) -> ConvergencePolicy {
        ConvergencePolicy {
            tolerance,
            max_iterations,
            patience,
        }
    }

    #[test]
    fn test_converging_sequence() {
        // x <- x / 2 towards 0.
        let (state, report) = run_fixed_point(&policy(0.01, 50, 3), 1.0, |x: &f64| (*x, x / 2.0));
        assert!(report.converged());
        assert_eq!(report.reason, StopReason::WithinTolerance);
        assert_eq!(report.iterations, 8);
        assert!(state < 0.01);
    }

    #[test]
    fn test_iteration_limit_keeps_best_state() {
        let (state, report) = run_fixed_point(&policy(1e-12, 5, 10), 1.0, |x: &f64| (*x, x * 0.5));
        assert_eq!(report.status, ConvergenceStatus::NotConverged);
        assert_eq!(report.reason, StopReason::IterationLimit);
        assert_eq!(report.iterations, 5);
        assert_eq!(state, 0.0625);
        assert_eq!(report.final_error, 0.0625);
    }

    #[test]
    fn test_oscillation_is_detected() {
        // Alternates between two states with different errors.
        let (state, report) =
            run_fixed_point(&policy(0.01, 50, 10), 0usize, |s: &usize| {
                let error = if s % 2 == 0 { 3.0 } else { 2.0 };
                (error, s + 1)
            });
        assert_eq!(report.reason, StopReason::Oscillating);
        assert_eq!(report.iterations, 3);
        assert_eq!(state, 1);
        assert_eq!(report.final_error, 2.0);
    }

    #[test]
    fn test_stall_is_detected() {
        let mut controller = ConvergenceController::new(policy(0.1, 50, 2));
        assert_eq!(controller.observe(1.0), Verdict::Continue);
        assert_eq!(controller.observe(1.5), Verdict::Continue);
        assert_eq!(controller.observe(f64::NAN), Verdict::Stop(StopReason::Stalled));
        assert_eq!(controller.best_error(), 1.0);
        assert_eq!(controller.iterations(), 3);
    }
}
