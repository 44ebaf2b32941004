use fieldcal_core::{Mat3, Real};
use nalgebra::{DMatrix, SVector};

use crate::HomographyError;

/// Linear camera matrix without distortion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneIntrinsics {
    pub fx: Real,
    pub fy: Real,
    pub cx: Real,
    pub cy: Real,
    pub skew: Real,
}

impl PlaneIntrinsics {
    pub fn kmtx(&self) -> Mat3 {
        Mat3::new(self.fx, self.skew, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }
}

/// Row `v_ij(H)` of Zhang's constraint matrix for homography columns `i`, `j`.
fn v_ij(hmtx: &Mat3, i: usize, j: usize) -> SVector<Real, 6> {
    let hi = hmtx.column(i);
    let hj = hmtx.column(j);
    SVector::<Real, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Pixel scale used to condition the homographies: the mean distance of the
/// imaged board origins from the image origin.
fn conditioning_scale(hmtxs: &[Mat3]) -> Real {
    let sum: Real = hmtxs
        .iter()
        .map(|h| {
            let w = h[(2, 2)];
            if w.abs() > Real::EPSILON {
                (h[(0, 2)] / w).hypot(h[(1, 2)] / w)
            } else {
                0.0
            }
        })
        .sum();
    let scale = sum / hmtxs.len() as Real;
    if scale.is_finite() && scale > 1.0 {
        scale
    } else {
        1.0
    }
}

/// Camera matrix from three or more homographies of a planar target
/// (target plane to image), with Zhang's closed-form solution.
///
/// The homographies are pre-scaled so pixel coordinates are of order one;
/// the scale is undone on the result. Distortion is ignored.
pub fn estimate_intrinsics_from_homographies(
    hmtxs: &[Mat3],
) -> Result<PlaneIntrinsics, HomographyError> {
    let m = hmtxs.len();
    if m < 3 {
        return Err(HomographyError::NotEnoughViews(m));
    }

    let s = conditioning_scale(hmtxs);
    let n = Mat3::new(1.0 / s, 0.0, 0.0, 0.0, 1.0 / s, 0.0, 0.0, 0.0, 1.0);

    // Pad so the SVD exposes the full V^T.
    let mut vmtx = DMatrix::<Real>::zeros((2 * m).max(6), 6);
    for (k, h) in hmtxs.iter().enumerate() {
        let h = n * h;
        let norm = h.norm();
        if norm <= Real::EPSILON {
            return Err(HomographyError::Degenerate);
        }
        let h = h / norm;
        let v11 = v_ij(&h, 0, 0);
        let v22 = v_ij(&h, 1, 1);
        let v12 = v_ij(&h, 0, 1);
        vmtx.row_mut(2 * k).copy_from(&v12.transpose());
        vmtx.row_mut(2 * k + 1).copy_from(&(v11 - v22).transpose());
    }

    let svd = vmtx.svd(false, true);
    let v_t = svd.v_t.ok_or(HomographyError::SvdFailed)?;
    let b = v_t.row(v_t.nrows() - 1);
    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let denom = b11 * b22 - b12 * b12;
    let denom_norm = b11 * b11 + b22 * b22;
    if denom_norm <= 0.0 || denom.abs() / denom_norm <= 1e-6 {
        return Err(HomographyError::Degenerate);
    }

    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    if lambda.signum() != b11.signum() {
        return Err(HomographyError::Degenerate);
    }

    let alpha = (lambda / b11).sqrt();
    let beta = (lambda * b11 / denom).sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    let estimate = PlaneIntrinsics {
        fx: s * alpha,
        fy: s * beta,
        cx: s * u0,
        cy: s * v0,
        skew: s * gamma,
    };
    let finite = [estimate.fx, estimate.fy, estimate.cx, estimate.cy, estimate.skew]
        .iter()
        .all(|v| v.is_finite());
    if !finite || estimate.fx <= 0.0 || estimate.fy <= 0.0 {
        return Err(HomographyError::Degenerate);
    }
    Ok(estimate)
}
