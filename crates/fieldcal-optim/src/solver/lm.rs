//! Damped Gauss-Newton loop over an incremental parameter vector.
//!
//! Each iteration linearises the problem around the current state with
//! forward differences, solves `(JᵀJ + λI) Δ = -Jᵀr` on the active slots by
//! Cholesky, and applies `Δ` only if the chi-square drops. λ shrinks by the
//! configured factor after a non-final accepted step and grows after a
//! rejection.

use std::time::{Duration, Instant};

use fieldcal_core::Real;
use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::jacobian::forward_difference_jacobian_with;

/// Problem expressed as residuals of a zero-centred increment.
///
/// The solver never sees absolute parameter values: `residuals(0)` is the
/// current state and `apply(delta)` moves the state by an accepted increment.
pub trait IncrementalProblem {
    /// Length of the increment vector.
    fn dim(&self) -> usize;
    /// Slots of the increment that are estimated, in column order.
    fn active_slots(&self) -> Vec<usize>;
    /// Weighted residuals at `current state + delta`. Must not mutate.
    fn residuals(&self, delta: &DVector<Real>) -> DVector<Real>;
    /// Commit an accepted increment.
    fn apply(&mut self, delta: &DVector<Real>);
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmOptions {
    pub initial_lambda: Real,
    pub lambda_factor: Real,
    /// Accepted steps that improve chi-square by less than this end the run.
    pub min_improvement: Real,
    /// The run stops on the first rejection that follows more than this many
    /// consecutive rejections; the default of 10 ends it on the 12th.
    pub max_rejections: usize,
    /// Wall-clock budget in seconds.
    pub timeout_s: Real,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            initial_lambda: 0.01,
            lambda_factor: 10.0,
            min_improvement: 0.001,
            max_rejections: 10,
            timeout_s: 10.0,
        }
    }
}

impl LmOptions {
    fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_s.max(0.0)).unwrap_or(Duration::MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LmOutcome {
    Converged,
    TimedOut,
    MaxRejections,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LmState {
    Idle,
    Running,
    Finished(LmOutcome),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LmReport {
    pub outcome: LmOutcome,
    pub initial_chi2: Real,
    pub final_chi2: Real,
    /// Chi-square after every accepted step.
    pub chi2_history: Vec<Real>,
    pub iterations: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub numerical_failures: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LmError {
    #[error("normal equations were singular on every attempt ({failures} failures)")]
    NumericalFailure { failures: usize },
    #[error("residuals at the starting point are not finite")]
    NonFiniteResiduals,
    #[error("no parameters to estimate")]
    NoActiveParameters,
}

fn chi2_of(r: &DVector<Real>) -> Option<Real> {
    let chi2 = r.norm_squared();
    chi2.is_finite().then_some(chi2)
}

/// Solve `(JᵀJ + λI) x = -Jᵀr`; `None` when the damped matrix is not
/// positive definite or the solution is not finite.
fn damped_step(jtj: &DMatrix<Real>, jtr: &DVector<Real>, lambda: Real) -> Option<DVector<Real>> {
    let n = jtj.nrows();
    let a = jtj + DMatrix::<Real>::identity(n, n) * lambda;
    let step = a.cholesky()?.solve(&(-jtr));
    step.iter().all(|v| v.is_finite()).then_some(step)
}

#[derive(Debug, Clone)]
pub struct LmSolver {
    options: LmOptions,
    state: LmState,
}

impl LmSolver {
    pub fn new(options: LmOptions) -> Self {
        Self {
            options,
            state: LmState::Idle,
        }
    }

    pub fn options(&self) -> &LmOptions {
        &self.options
    }

    pub fn state(&self) -> LmState {
        self.state
    }

    /// Run the loop to termination, mutating `problem` only through
    /// [`IncrementalProblem::apply`] with accepted steps.
    pub fn solve<P: IncrementalProblem>(&mut self, problem: &mut P) -> Result<LmReport, LmError> {
        let active = problem.active_slots();
        if active.is_empty() {
            return Err(LmError::NoActiveParameters);
        }
        let dim = problem.dim();
        let zero = DVector::<Real>::zeros(dim);

        let mut residuals = problem.residuals(&zero);
        let mut chi2 = chi2_of(&residuals).ok_or(LmError::NonFiniteResiduals)?;
        let initial_chi2 = chi2;

        self.state = LmState::Running;
        let start = Instant::now();
        let timeout = self.options.timeout();
        let mut lambda = self.options.initial_lambda;

        let mut report = LmReport {
            outcome: LmOutcome::Converged,
            initial_chi2,
            final_chi2: chi2,
            chi2_history: Vec::new(),
            iterations: 0,
            accepted: 0,
            rejected: 0,
            numerical_failures: 0,
            elapsed: Duration::ZERO,
        };
        debug!("initial chi-square {chi2:.6e} over {} parameters", active.len());

        if chi2 == 0.0 {
            return Ok(self.finish(report, LmOutcome::Converged, start));
        }

        let mut consecutive_rejections = 0usize;
        let mut linearisation: Option<(DMatrix<Real>, DVector<Real>)> = None;

        let outcome = loop {
            report.iterations += 1;

            let (jtj, jtr) = linearisation.get_or_insert_with(|| {
                let jac = forward_difference_jacobian_with(
                    |d| problem.residuals(d),
                    &zero,
                    &active,
                    &residuals,
                );
                (jac.tr_mul(&jac), jac.tr_mul(&residuals))
            });

            let candidate = damped_step(jtj, jtr, lambda).and_then(|step| {
                let mut delta = DVector::<Real>::zeros(dim);
                for (k, &slot) in active.iter().enumerate() {
                    delta[slot] = step[k];
                }
                let r_new = problem.residuals(&delta);
                chi2_of(&r_new).map(|c| (delta, c))
            });

            match candidate {
                Some((delta, new_chi2)) if new_chi2 < chi2 => {
                    problem.apply(&delta);
                    let improvement = chi2 - new_chi2;
                    residuals = problem.residuals(&zero);
                    chi2 = chi2_of(&residuals).unwrap_or(new_chi2);
                    report.accepted += 1;
                    report.chi2_history.push(chi2);
                    linearisation = None;
                    debug!("accepted step {}: chi-square {chi2:.6e}, lambda {lambda:.1e}", report.accepted);

                    if improvement < self.options.min_improvement {
                        break LmOutcome::Converged;
                    }
                    lambda /= self.options.lambda_factor;
                    consecutive_rejections = 0;
                }
                other => {
                    if other.is_none() {
                        report.numerical_failures += 1;
                    }
                    report.rejected += 1;
                    lambda *= self.options.lambda_factor;
                    if consecutive_rejections > self.options.max_rejections {
                        break LmOutcome::MaxRejections;
                    }
                    consecutive_rejections += 1;
                }
            }

            if start.elapsed() > timeout {
                break LmOutcome::TimedOut;
            }
        };

        report.final_chi2 = chi2;
        if report.accepted == 0 && report.numerical_failures > 0 && report.numerical_failures == report.rejected {
            self.state = LmState::Finished(outcome);
            warn!("normal equations singular on all {} attempts", report.numerical_failures);
            return Err(LmError::NumericalFailure {
                failures: report.numerical_failures,
            });
        }
        Ok(self.finish(report, outcome, start))
    }

    fn finish(&mut self, mut report: LmReport, outcome: LmOutcome, start: Instant) -> LmReport {
        report.outcome = outcome;
        report.elapsed = start.elapsed();
        self.state = LmState::Finished(outcome);
        info!(
            "LM finished ({outcome:?}) after {} iterations: chi-square {:.6e} -> {:.6e}",
            report.iterations, report.initial_chi2, report.final_chi2
        );
        report
    }
}
