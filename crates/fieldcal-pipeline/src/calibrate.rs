//! Calibration passes for the two camera models.
//!
//! Both passes work on copies: the starting camera and the correspondence
//! store are only read, and the caller commits the returned camera.

use fieldcal_core::{
    CameraModelKind, CorrespondenceStore, PinholeCamera, Pt2, Pt3, QuaternionCamera, Real, Vec3,
};
use fieldcal_linear::{dlt_homography, estimate_planar_pose_from_h, focal_from_homography};
use fieldcal_optim::{
    camera_slots, optimize_pinhole, CalibrationMode, LmOutcome, LmSolver,
    PinholeFixFlags, QuaternionCalibrationProblem,
};
use log::{debug, info, warn};

use crate::{CalibrationConfig, CalibrationError, CalibrationReport};

/// Corners needed to pin down the pose.
pub const MIN_CORNERS: usize = 4;

/// Focal length used when neither the homography nor the image size gives one.
const FALLBACK_FOCAL_LENGTH: Real = 500.0;

#[derive(Debug, Clone)]
pub struct QuaternionPass {
    pub camera: QuaternionCamera,
    /// Estimated segment parameters in store order; empty in four-point mode.
    pub alphas: Vec<Real>,
    pub report: CalibrationReport,
}

#[derive(Debug, Clone)]
pub struct PinholePass {
    pub camera: PinholeCamera,
    pub report: CalibrationReport,
}

fn detected_corners(store: &CorrespondenceStore) -> Vec<(Pt3, Pt2)> {
    store.detected_corners().map(|c| (c.field, c.image)).collect()
}

fn require_corners(available: usize, required: usize) -> Result<(), CalibrationError> {
    if available < required {
        return Err(CalibrationError::InsufficientData {
            required,
            available,
        });
    }
    Ok(())
}

/// Damped Gauss-Newton pass over the quaternion model.
///
/// In [`CalibrationMode::FullEstimation`] every detected segment observation
/// gets an `alpha` slot; observations that were never seeded are seeded from
/// `start` on a private copy of the store.
pub fn calibrate_quaternion(
    start: &QuaternionCamera,
    store: &CorrespondenceStore,
    config: &CalibrationConfig,
    mode: CalibrationMode,
) -> Result<QuaternionPass, CalibrationError> {
    config.validate()?;
    let corner_count = store.detected_corner_count();
    require_corners(corner_count, MIN_CORNERS)?;

    let mut work = store.clone();
    if mode == CalibrationMode::FullEstimation {
        work.seed_alphas(start);
        let points = work.detected_point_count();
        let rows = 2 * (corner_count + points);
        let params = camera_slots(mode, config.estimate_camera_height).len() + points;
        require_corners(rows, params)?;
    }

    let mut problem = QuaternionCalibrationProblem::from_store(
        start.clone(),
        &work,
        mode,
        config.covariance(),
        config.estimate_camera_height,
    )
    .map_err(|e| CalibrationError::InvalidConfig(e.to_string()))?;
    info!(
        "quaternion calibration ({mode:?}): {} corners, {} segment points",
        problem.corner_count(),
        problem.segment_point_count()
    );

    let lm = LmSolver::new(config.lm_options()).solve(&mut problem)?;
    let rmse = problem.pixel_rmse().unwrap_or(0.0);
    let flips = problem.flips();
    let alpha_count = problem.alphas().len();
    let (camera, alphas) = problem.into_parts();
    debug!(
        "quaternion camera: f {:.3}, pp ({:.2}, {:.2}), dist {:.5}, t {:?}",
        camera.intrinsics.focal_length(),
        camera.intrinsics.principal_point().x,
        camera.intrinsics.principal_point().y,
        camera.intrinsics.distortion(),
        camera.extrinsics.translation(),
    );

    Ok(QuaternionPass {
        camera,
        alphas,
        report: CalibrationReport {
            mode,
            model_kind: CameraModelKind::Quaternion,
            rmse,
            outcome: Some(lm.outcome),
            converged: lm.outcome == LmOutcome::Converged,
            initial_chi2: lm.initial_chi2,
            final_chi2: lm.final_chi2,
            iterations: lm.iterations,
            corner_count,
            alpha_count,
            flips,
        },
    })
}

/// Give a factory-default pinhole camera a pose (and, if needed, a focal
/// length) from the field-plane homography of the corners.
fn initial_pinhole(
    start: &PinholeCamera,
    corners: &[(Pt3, Pt2)],
    config: &CalibrationConfig,
) -> Result<PinholeCamera, CalibrationError> {
    let mut camera = start.clone();
    let unposed = camera.extrinsics.rvec() == Vec3::zeros() && camera.extrinsics.tvec() == Vec3::zeros();
    if !unposed {
        return Ok(camera);
    }

    let world: Vec<Pt2> = corners.iter().map(|(f, _)| Pt2::new(f.x, f.y)).collect();
    let image: Vec<Pt2> = corners.iter().map(|(_, i)| *i).collect();
    let hmtx = dlt_homography(&world, &image)?;

    if camera.intrinsics.focal_length_x() <= 1.0 {
        let pp = config
            .image_center()
            .unwrap_or_else(|| camera.intrinsics.principal_point());
        let fallback = if config.image_width > 0 {
            config.image_width as Real
        } else {
            FALLBACK_FOCAL_LENGTH
        };
        let f = focal_from_homography(&hmtx, &pp).unwrap_or_else(|| {
            warn!("no focal length from the field homography, starting from {fallback}");
            fallback
        });
        camera.intrinsics.set_principal_point(pp.x, pp.y);
        camera.intrinsics.set_focal_length(f, f);
    }

    let pose = estimate_planar_pose_from_h(camera.intrinsics.camera_mat(), &hmtx)?;
    camera
        .extrinsics
        .set_pose(pose.rotation.scaled_axis(), pose.translation.vector);
    debug!(
        "pinhole initial guess: f {:.1}, rvec {:?}, tvec {:?}",
        camera.intrinsics.focal_length_x(),
        camera.extrinsics.rvec(),
        camera.extrinsics.tvec()
    );
    Ok(camera)
}

/// Library solver pass over the pinhole model.
///
/// [`CalibrationMode::FourPointInitial`] estimates the pose only;
/// [`CalibrationMode::FullEstimation`] also frees the intrinsics not fixed in
/// the configuration.
pub fn calibrate_pinhole(
    start: &PinholeCamera,
    store: &CorrespondenceStore,
    config: &CalibrationConfig,
    mode: CalibrationMode,
) -> Result<PinholePass, CalibrationError> {
    config.validate()?;
    let corners = detected_corners(store);
    let corner_count = corners.len();
    require_corners(corner_count, MIN_CORNERS)?;

    let fix = match mode {
        CalibrationMode::FourPointInitial => PinholeFixFlags::extrinsics_only(),
        CalibrationMode::FullEstimation => config.pinhole_fix,
    };
    require_corners(corner_count, fix.free_param_count().div_ceil(2))?;

    let initial = initial_pinhole(start, &corners, config)?;
    info!("pinhole calibration ({mode:?}): {corner_count} corners");
    let solution = optimize_pinhole(
        &initial,
        corners,
        fix,
        config.covariance(),
        &config.library_solver,
    )
    .map_err(|e| {
        warn!("pinhole calibration failed: {e:#}");
        CalibrationError::ExternalLibrary(format!("{e:#}"))
    })?;
    let n = corner_count as Real;
    Ok(PinholePass {
        camera: solution.camera,
        report: CalibrationReport {
            mode,
            model_kind: CameraModelKind::Pinhole,
            rmse: solution.rms,
            outcome: None,
            converged: solution.report.converged,
            initial_chi2: solution.initial_rms * solution.initial_rms * n,
            final_chi2: solution.rms * solution.rms * n,
            iterations: solution.report.iterations,
            corner_count,
            alpha_count: 0,
            flips: 0,
        },
    })
}
