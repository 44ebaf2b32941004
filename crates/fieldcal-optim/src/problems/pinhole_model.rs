//! Pinhole + Brown-Conrady calibration over absolute parameters, solved by
//! the MINPACK-style backend.
//!
//! Full parameter layout: `[fx, fy, cx, cy, k1, k2, p1, p2, k3, rx, ry, rz,
//! tx, ty, tz]`. Fixed entries are removed from the optimisation vector and
//! taken from the starting camera. Residual rows are scaled by the corner
//! covariances, like the corner rows of the quaternion problem.

use anyhow::{bail, ensure, Result};
use fieldcal_core::{
    BrownConrady5, FieldProjection, PinholeCamera, PinholeIntrinsics, Pt2, Pt3, Real,
    RvecExtrinsics, Vec3,
};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::backend_lm::LmBackend;
use crate::problems::quaternion_model::ObservationCovariance;
use crate::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};

const FX: usize = 0;
const FY: usize = 1;
const CX: usize = 2;
const CY: usize = 3;
const K1: usize = 4;
const K2: usize = 5;
const P1: usize = 6;
const P2: usize = 7;
const K3: usize = 8;
/// Length of the shared intrinsic block `[fx, fy, cx, cy, k1, k2, p1, p2, k3]`.
pub(crate) const INTRINSIC_DIM: usize = 9;
const FULL_DIM: usize = 15;

/// Which intrinsic parameters are held at their starting values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PinholeFixFlags {
    pub fix_focal_length: bool,
    pub fix_principal_point: bool,
    pub fix_tangential_distortion: bool,
    pub fix_k1: bool,
    pub fix_k2: bool,
    pub fix_k3: bool,
}

impl PinholeFixFlags {
    /// Every intrinsic fixed; only the pose is estimated.
    pub fn extrinsics_only() -> Self {
        Self {
            fix_focal_length: true,
            fix_principal_point: true,
            fix_tangential_distortion: true,
            fix_k1: true,
            fix_k2: true,
            fix_k3: true,
        }
    }

    /// Number of parameters left free, pose included.
    pub fn free_param_count(&self) -> usize {
        self.free_indices().len()
    }

    fn is_fixed(&self, i: usize) -> bool {
        match i {
            FX | FY => self.fix_focal_length,
            CX | CY => self.fix_principal_point,
            K1 => self.fix_k1,
            K2 => self.fix_k2,
            P1 | P2 => self.fix_tangential_distortion,
            K3 => self.fix_k3,
            _ => false,
        }
    }

    fn free_indices(&self) -> Vec<usize> {
        (0..FULL_DIM).filter(|&i| !self.is_fixed(i)).collect()
    }

    /// Free entries of the intrinsic block only.
    pub(crate) fn free_intrinsic_indices(&self) -> Vec<usize> {
        (0..INTRINSIC_DIM).filter(|&i| !self.is_fixed(i)).collect()
    }
}

pub(crate) fn intrinsics_to_array(k: &PinholeIntrinsics) -> [Real; INTRINSIC_DIM] {
    let pp = k.principal_point();
    let [k1, k2, p1, p2, k3] = k.distortion().coeffs();
    [k.focal_length_x(), k.focal_length_y(), pp.x, pp.y, k1, k2, p1, p2, k3]
}

pub(crate) fn intrinsics_from_slice(v: &[Real], iters: u32) -> PinholeIntrinsics {
    PinholeIntrinsics::new(
        v[FX],
        v[FY],
        v[CX],
        v[CY],
        BrownConrady5::from_coeffs([v[K1], v[K2], v[P1], v[P2], v[K3]], iters),
    )
}

/// Pose entries `[rx, ry, rz, tx, ty, tz]` as stored after the intrinsics.
pub(crate) fn pose_to_array(pose: &RvecExtrinsics) -> [Real; 6] {
    let r = pose.rvec();
    let t = pose.tvec();
    [r.x, r.y, r.z, t.x, t.y, t.z]
}

pub(crate) fn pose_from_slice(v: &[Real]) -> RvecExtrinsics {
    RvecExtrinsics::new(Vec3::new(v[0], v[1], v[2]), Vec3::new(v[3], v[4], v[5]))
}

fn to_full(camera: &PinholeCamera) -> [Real; FULL_DIM] {
    let mut full = [0.0; FULL_DIM];
    full[..INTRINSIC_DIM].copy_from_slice(&intrinsics_to_array(&camera.intrinsics));
    full[INTRINSIC_DIM..].copy_from_slice(&pose_to_array(&camera.extrinsics));
    full
}

fn from_full(v: &[Real; FULL_DIM], iters: u32) -> PinholeCamera {
    PinholeCamera::new(
        intrinsics_from_slice(&v[..INTRINSIC_DIM], iters),
        pose_from_slice(&v[INTRINSIC_DIM..]),
    )
}

#[derive(Debug, Clone)]
pub struct PinholeCalibrationProblem {
    start: [Real; FULL_DIM],
    iters: u32,
    free: Vec<usize>,
    corners: Vec<(Pt3, Pt2)>,
    covariance: ObservationCovariance,
}

impl PinholeCalibrationProblem {
    /// Only the corner entries of `covariance` are used.
    pub fn new(
        start: &PinholeCamera,
        corners: Vec<(Pt3, Pt2)>,
        fix: PinholeFixFlags,
        covariance: ObservationCovariance,
    ) -> Result<Self> {
        covariance.validate()?;
        let free = fix.free_indices();
        ensure!(
            2 * corners.len() >= free.len(),
            "{} residuals cannot determine {} parameters",
            2 * corners.len(),
            free.len()
        );
        Ok(Self {
            start: to_full(start),
            iters: start.intrinsics.distortion().iters,
            free,
            corners,
            covariance,
        })
    }

    /// Starting values of the free parameters.
    pub fn initial_params(&self) -> DVector<Real> {
        DVector::from_iterator(self.free.len(), self.free.iter().map(|&i| self.start[i]))
    }

    pub fn free_param_count(&self) -> usize {
        self.free.len()
    }

    /// Camera with the free parameters set from `x`.
    pub fn camera_at(&self, x: &DVector<Real>) -> PinholeCamera {
        let mut full = self.start;
        for (k, &i) in self.free.iter().enumerate() {
            full[i] = x[k];
        }
        from_full(&full, self.iters)
    }

    pub fn rmse_at(&self, x: &DVector<Real>) -> Real {
        if self.corners.is_empty() {
            return 0.0;
        }
        let r = self.residuals_unweighted(x);
        (r.norm_squared() / self.corners.len() as Real).sqrt()
    }
}

impl NllsProblem for PinholeCalibrationProblem {
    fn num_params(&self) -> usize {
        self.free.len()
    }

    fn num_residuals(&self) -> usize {
        2 * self.corners.len()
    }

    fn residuals_unweighted(&self, x: &DVector<Real>) -> DVector<Real> {
        let camera = self.camera_at(x);
        let mut r = DVector::zeros(self.num_residuals());
        for (k, (field, image)) in self.corners.iter().enumerate() {
            let proj = camera.field_to_image(field);
            r[2 * k] = proj.x - image.x;
            r[2 * k + 1] = proj.y - image.y;
        }
        r
    }

    fn row_scales(&self) -> DVector<Real> {
        let [sx, sy] = self.covariance.corner_scale();
        DVector::from_fn(self.num_residuals(), |i, _| if i % 2 == 0 { sx } else { sy })
    }
}

#[derive(Debug, Clone)]
pub struct PinholeSolution {
    pub camera: PinholeCamera,
    /// RMS reprojection error of the starting camera, in pixels.
    pub initial_rms: Real,
    /// RMS reprojection error in pixels.
    pub rms: Real,
    pub report: SolveReport,
}

/// Refine `start` against the corner correspondences.
///
/// Fails when the backend reports a numerical or usage problem; `start` is
/// never modified.
pub fn optimize_pinhole(
    start: &PinholeCamera,
    corners: Vec<(Pt3, Pt2)>,
    fix: PinholeFixFlags,
    covariance: ObservationCovariance,
    opts: &SolveOptions,
) -> Result<PinholeSolution> {
    let problem = PinholeCalibrationProblem::new(start, corners, fix, covariance)?;
    let x0 = problem.initial_params();
    let initial_rms = problem.rmse_at(&x0);
    let (x, report) = LmBackend.solve(&problem, x0, opts);
    if let Some(reason) = &report.failure {
        bail!("pinhole calibration failed: {reason}");
    }
    ensure!(x.iter().all(|v| v.is_finite()), "pinhole calibration produced non-finite parameters");
    Ok(PinholeSolution {
        camera: problem.camera_at(&x),
        initial_rms,
        rms: problem.rmse_at(&x),
        report,
    })
}
