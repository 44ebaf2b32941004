use fieldcal_core::Real;
use nalgebra::{DMatrix, DVector};

use crate::jacobian::forward_difference_jacobian_scaled;

/// Generic non-linear least squares problem with dense parameter/residual vectors.
///
/// The default implementations scale residual rows by `row_scales`, which is
/// how per-axis observation covariances enter the cost. The scales are
/// constant per row and are not differentiated.
pub trait NllsProblem {
    /// Number of parameters in the optimization vector.
    fn num_params(&self) -> usize;
    /// Number of residual rows in the problem.
    fn num_residuals(&self) -> usize;

    /// Unweighted residuals (pixels) for the given parameters.
    fn residuals_unweighted(&self, x: &DVector<Real>) -> DVector<Real>;

    /// Unweighted Jacobian. Defaults to forward differences with a step
    /// scaled to the magnitude of each parameter.
    fn jacobian_unweighted(&self, x: &DVector<Real>) -> DMatrix<Real> {
        let active: Vec<usize> = (0..x.len()).collect();
        forward_difference_jacobian_scaled(|p| self.residuals_unweighted(p), x, &active)
    }

    /// Per-row scales (`1/sqrt(cov)`).
    fn row_scales(&self) -> DVector<Real> {
        DVector::from_element(self.num_residuals(), 1.0)
    }

    /// Weighted residuals used by the solver.
    fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
        let mut r = self.residuals_unweighted(x);
        let scales = self.row_scales();
        debug_assert_eq!(scales.len(), r.len());
        r.component_mul_assign(&scales);
        r
    }

    /// Weighted Jacobian used by the solver.
    fn jacobian(&self, x: &DVector<Real>) -> DMatrix<Real> {
        let scales = self.row_scales();
        let mut j = self.jacobian_unweighted(x);
        debug_assert_eq!(scales.len(), j.nrows());
        for (mut row, scale) in j.row_iter_mut().zip(scales.iter()) {
            if *scale != 1.0 {
                row.scale_mut(*scale);
            }
        }
        j
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Maximum number of solver iterations before termination.
    ///
    /// The LM backend follows the MINPACK convention and caps function
    /// evaluations at `max_iters * (n + 1)`.
    pub max_iters: usize,
    /// Relative tolerance on the objective (cost) reduction.
    pub ftol: Real,
    /// Orthogonality/gradient tolerance.
    pub gtol: Real,
    /// Relative tolerance on parameter updates.
    pub xtol: Real,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 200,
            ftol: 1e-12,
            gtol: 1e-12,
            xtol: 1e-12,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    pub iterations: usize,
    /// Half the squared norm of the weighted residuals.
    pub final_cost: Real,
    pub converged: bool,
    /// Set when the backend gave up for a numerical or usage reason; the
    /// returned parameters must not be used.
    pub failure: Option<String>,
}

pub trait NllsSolverBackend {
    fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<Real>,
        opts: &SolveOptions,
    ) -> (DVector<Real>, SolveReport);
}
