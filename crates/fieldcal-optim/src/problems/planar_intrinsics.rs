//! Shared pinhole intrinsics from several views of a planar target.
//!
//! Parameter layout: the free entries of `[fx, fy, cx, cy, k1, k2, p1, p2,
//! k3]` followed by `[rx, ry, rz, tx, ty, tz]` for every view. Each view
//! contributes two rows per corner, scaled by the corner covariances.

use anyhow::{ensure, Result};
use fieldcal_core::{FieldProjection, PinholeCamera, PinholeIntrinsics, Pt2, Pt3, Real, RvecExtrinsics};
use nalgebra::DVector;

use crate::backend_lm::LmBackend;
use crate::problems::pinhole_model::{
    intrinsics_from_slice, intrinsics_to_array, pose_from_slice, pose_to_array, INTRINSIC_DIM,
};
use crate::problems::quaternion_model::ObservationCovariance;
use crate::{NllsProblem, NllsSolverBackend, PinholeFixFlags, SolveOptions, SolveReport};

const POSE_DIM: usize = 6;

/// Target corners of one view: target-frame point and its pixel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanarView {
    pub corners: Vec<(Pt3, Pt2)>,
}

impl PlanarView {
    pub fn new(corners: Vec<(Pt3, Pt2)>) -> Self {
        Self { corners }
    }

    pub fn len(&self) -> usize {
        self.corners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corners.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct PlanarIntrinsicsProblem {
    start: [Real; INTRINSIC_DIM],
    iters: u32,
    free: Vec<usize>,
    views: Vec<PlanarView>,
    poses: Vec<[Real; POSE_DIM]>,
    covariance: ObservationCovariance,
}

impl PlanarIntrinsicsProblem {
    /// `poses[i]` is the starting target-to-camera pose of `views[i]`. Only
    /// the corner entries of `covariance` are used.
    pub fn new(
        start: &PinholeIntrinsics,
        views: Vec<PlanarView>,
        poses: &[RvecExtrinsics],
        fix: PinholeFixFlags,
        covariance: ObservationCovariance,
    ) -> Result<Self> {
        covariance.validate()?;
        ensure!(!views.is_empty(), "need at least one view of the target");
        ensure!(
            views.len() == poses.len(),
            "{} views but {} starting poses",
            views.len(),
            poses.len()
        );
        for (i, view) in views.iter().enumerate() {
            ensure!(view.len() >= 4, "view {i} has {} corners, need at least 4", view.len());
        }
        let free = fix.free_intrinsic_indices();
        let problem = Self {
            start: intrinsics_to_array(start),
            iters: start.distortion().iters,
            free,
            views,
            poses: poses.iter().map(pose_to_array).collect(),
            covariance,
        };
        ensure!(
            problem.num_residuals() >= problem.num_params(),
            "{} residuals cannot determine {} parameters",
            problem.num_residuals(),
            problem.num_params()
        );
        Ok(problem)
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    pub fn corner_count(&self) -> usize {
        self.views.iter().map(PlanarView::len).sum()
    }

    pub fn initial_params(&self) -> DVector<Real> {
        let intrinsics = self.free.iter().map(|&i| self.start[i]);
        let poses = self.poses.iter().flatten().copied();
        DVector::from_iterator(self.num_params(), intrinsics.chain(poses))
    }

    pub fn intrinsics_at(&self, x: &DVector<Real>) -> PinholeIntrinsics {
        let mut full = self.start;
        for (k, &i) in self.free.iter().enumerate() {
            full[i] = x[k];
        }
        intrinsics_from_slice(&full, self.iters)
    }

    pub fn poses_at(&self, x: &DVector<Real>) -> Vec<RvecExtrinsics> {
        let offset = self.free.len();
        (0..self.views.len())
            .map(|v| {
                let at = offset + POSE_DIM * v;
                pose_from_slice(&x.as_slice()[at..at + POSE_DIM])
            })
            .collect()
    }

    /// Unweighted RMS pixel error per corner.
    pub fn rmse_at(&self, x: &DVector<Real>) -> Real {
        let n = self.corner_count();
        if n == 0 {
            return 0.0;
        }
        (self.residuals_unweighted(x).norm_squared() / n as Real).sqrt()
    }
}

impl NllsProblem for PlanarIntrinsicsProblem {
    fn num_params(&self) -> usize {
        self.free.len() + POSE_DIM * self.views.len()
    }

    fn num_residuals(&self) -> usize {
        2 * self.corner_count()
    }

    fn residuals_unweighted(&self, x: &DVector<Real>) -> DVector<Real> {
        let intrinsics = self.intrinsics_at(x);
        let mut r = DVector::zeros(self.num_residuals());
        let mut row = 0;
        for (view, pose) in self.views.iter().zip(self.poses_at(x)) {
            let camera = PinholeCamera::new(intrinsics.clone(), pose);
            for (target, image) in &view.corners {
                let proj = camera.field_to_image(target);
                r[row] = proj.x - image.x;
                r[row + 1] = proj.y - image.y;
                row += 2;
            }
        }
        r
    }

    fn row_scales(&self) -> DVector<Real> {
        let [sx, sy] = self.covariance.corner_scale();
        DVector::from_fn(self.num_residuals(), |i, _| if i % 2 == 0 { sx } else { sy })
    }
}

#[derive(Debug, Clone)]
pub struct PlanarIntrinsicsSolution {
    pub intrinsics: PinholeIntrinsics,
    /// Refined target-to-camera pose per view.
    pub poses: Vec<RvecExtrinsics>,
    pub initial_rms: Real,
    pub rms: Real,
    pub report: SolveReport,
}

/// Refine shared intrinsics and per-view poses with the MINPACK-style
/// backend.
pub fn optimize_planar_intrinsics(
    start: &PinholeIntrinsics,
    views: Vec<PlanarView>,
    poses: &[RvecExtrinsics],
    fix: PinholeFixFlags,
    covariance: ObservationCovariance,
    opts: &SolveOptions,
) -> Result<PlanarIntrinsicsSolution> {
    let problem = PlanarIntrinsicsProblem::new(start, views, poses, fix, covariance)?;
    let x0 = problem.initial_params();
    let initial_rms = problem.rmse_at(&x0);

    let (x, report) = LmBackend.solve(&problem, x0, opts);
    if let Some(reason) = &report.failure {
        anyhow::bail!("planar intrinsics solve failed: {reason}");
    }
    let rms = problem.rmse_at(&x);
    ensure!(rms.is_finite(), "planar intrinsics solve produced a non-finite error");
    Ok(PlanarIntrinsicsSolution {
        intrinsics: problem.intrinsics_at(&x),
        poses: problem.poses_at(&x),
        initial_rms,
        rms,
        report,
    })
}
