//! Forward-difference Jacobians.
//!
//! Columns are produced only for the `active` parameter indices, in the
//! order given. Inactive parameters are never perturbed.

use fieldcal_core::Real;
use nalgebra::{DMatrix, DVector};

/// Perturbation used for every parameter: `sqrt(f64::EPSILON)`.
pub fn fd_step() -> Real {
    Real::EPSILON.sqrt()
}

/// Jacobian of `f` at `x` with an absolute step of [`fd_step`].
pub fn forward_difference_jacobian<F>(f: F, x: &DVector<Real>, active: &[usize]) -> DMatrix<Real>
where
    F: Fn(&DVector<Real>) -> DVector<Real>,
{
    let r0 = f(x);
    forward_difference_jacobian_with(f, x, active, &r0)
}

/// Same as [`forward_difference_jacobian`] with the residuals at `x` already
/// evaluated.
pub fn forward_difference_jacobian_with<F>(
    f: F,
    x: &DVector<Real>,
    active: &[usize],
    r0: &DVector<Real>,
) -> DMatrix<Real>
where
    F: Fn(&DVector<Real>) -> DVector<Real>,
{
    fill_columns(f, x, active, r0, |_| fd_step())
}

/// Forward differences with step `sqrt(eps) * max(1, |x_i|)`, for problems
/// whose parameters are absolute values of very different magnitude.
pub fn forward_difference_jacobian_scaled<F>(
    f: F,
    x: &DVector<Real>,
    active: &[usize],
) -> DMatrix<Real>
where
    F: Fn(&DVector<Real>) -> DVector<Real>,
{
    let r0 = f(x);
    fill_columns(f, x, active, &r0, |xi| fd_step() * xi.abs().max(1.0))
}

fn fill_columns<F, S>(
    f: F,
    x: &DVector<Real>,
    active: &[usize],
    r0: &DVector<Real>,
    step_for: S,
) -> DMatrix<Real>
where
    F: Fn(&DVector<Real>) -> DVector<Real>,
    S: Fn(Real) -> Real,
{
    let mut jac = DMatrix::<Real>::zeros(r0.len(), active.len());
    let mut xp = x.clone();
    for (col, &i) in active.iter().enumerate() {
        let h = step_for(x[i]);
        xp[i] = x[i] + h;
        // Use the representable step to keep the quotient consistent.
        let h_eff = xp[i] - x[i];
        let r = f(&xp);
        xp[i] = x[i];
        jac.set_column(col, &((r - r0) / h_eff));
    }
    jac
}
