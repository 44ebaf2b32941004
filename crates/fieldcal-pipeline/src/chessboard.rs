//! Multi-view chessboard calibration of the pinhole intrinsics.
//!
//! Chessboard samples are the detected inner corners of one image, row by
//! row. Their target points are `(x, y, 0)` per grid index, so translations
//! come out in board squares. Samples too close to an accepted one are
//! dropped to keep the view set diverse.

use fieldcal_core::{BrownConrady5, Mat3, PinholeIntrinsics, Pt2, Pt3, Real, RvecExtrinsics};
use fieldcal_linear::{
    dlt_homography, estimate_intrinsics_from_homographies, estimate_planar_pose_from_h,
};
use fieldcal_optim::{optimize_planar_intrinsics, PlanarView};
use log::{debug, info, warn};

use crate::{CalibrationConfig, CalibrationError, IntrinsicsReport};

/// Views needed for the closed-form starting intrinsics.
pub const MIN_CHESSBOARD_VIEWS: usize = 3;

/// Accepted chessboard samples for one grid size.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChessboardSamples {
    grid_width: u32,
    grid_height: u32,
    samples: Vec<Vec<Pt2>>,
}

/// Mean over corners of the squared pixel distance.
fn mean_sq_diff(a: &[Pt2], b: &[Pt2]) -> Real {
    let sum: Real = a.iter().zip(b).map(|(p, q)| (p - q).norm_squared()).sum();
    sum / a.len() as Real
}

impl ChessboardSamples {
    pub fn new(grid_width: u32, grid_height: u32) -> Self {
        Self {
            grid_width,
            grid_height,
            samples: Vec::new(),
        }
    }

    pub fn grid_size(&self) -> (u32, u32) {
        (self.grid_width, self.grid_height)
    }

    pub fn corners_per_sample(&self) -> usize {
        self.grid_width as usize * self.grid_height as usize
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Vec<Pt2>] {
        &self.samples
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Target points of one sample, `x` running fastest.
    pub fn object_points(&self) -> Vec<Pt3> {
        (0..self.grid_height)
            .flat_map(|y| (0..self.grid_width).map(move |x| Pt3::new(x as Real, y as Real, 0.0)))
            .collect()
    }

    /// Add a sample for a `grid_width` x `grid_height` board.
    ///
    /// A different grid size from the stored one drops every earlier sample.
    /// Returns `Ok(false)` when the mean squared corner offset to an accepted
    /// sample is below `threshold`.
    pub fn add(
        &mut self,
        grid_width: u32,
        grid_height: u32,
        corners: Vec<Pt2>,
        threshold: Real,
    ) -> Result<bool, CalibrationError> {
        if (grid_width, grid_height) != self.grid_size() {
            if !self.samples.is_empty() {
                info!(
                    "chessboard grid changed to {grid_width}x{grid_height}, dropping {} samples",
                    self.samples.len()
                );
            }
            *self = Self::new(grid_width, grid_height);
        }
        let expected = self.corners_per_sample();
        if corners.len() != expected || expected == 0 {
            return Err(CalibrationError::InvalidSample(format!(
                "{} corners for a {grid_width}x{grid_height} grid",
                corners.len()
            )));
        }
        if !corners.iter().all(|c| c.x.is_finite() && c.y.is_finite()) {
            return Err(CalibrationError::InvalidSample("non-finite corner".into()));
        }
        if self
            .samples
            .iter()
            .any(|s| mean_sq_diff(s, &corners) < threshold)
        {
            debug!("chessboard sample too close to an accepted one, skipped");
            return Ok(false);
        }
        self.samples.push(corners);
        Ok(true)
    }

    fn views(&self) -> Vec<PlanarView> {
        let target = self.object_points();
        self.samples
            .iter()
            .map(|s| PlanarView::new(target.iter().copied().zip(s.iter().copied()).collect()))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct IntrinsicsPass {
    pub intrinsics: PinholeIntrinsics,
    pub report: IntrinsicsReport,
}

/// Closed-form intrinsics from the sample homographies. A fixed principal
/// point is taken from the image centre when the image size is known.
fn closed_form_start(
    homographies: &[Mat3],
    config: &CalibrationConfig,
    iters: u32,
) -> Result<PinholeIntrinsics, CalibrationError> {
    let estimate = estimate_intrinsics_from_homographies(homographies)?;
    let (cx, cy) = match config.image_center() {
        Some(c) if config.intrinsic_fix.fix_principal_point => (c.x, c.y),
        _ => (estimate.cx, estimate.cy),
    };
    debug!(
        "closed-form intrinsics: f=({:.1}, {:.1}) c=({cx:.1}, {cy:.1})",
        estimate.fx, estimate.fy
    );
    Ok(PinholeIntrinsics::new(
        estimate.fx,
        estimate.fy,
        cx,
        cy,
        BrownConrady5 {
            iters,
            ..BrownConrady5::default()
        },
    ))
}

/// Refine pinhole intrinsics over every accepted chessboard sample.
///
/// `current` seeds the solve when `use_intrinsic_guess` is set; otherwise
/// the start is the closed-form estimate with zero distortion. Only the
/// intrinsics are returned; the per-view board poses are discarded.
pub fn calibrate_chessboard_intrinsics(
    current: &PinholeIntrinsics,
    samples: &ChessboardSamples,
    config: &CalibrationConfig,
) -> Result<IntrinsicsPass, CalibrationError> {
    config.validate()?;
    let sample_count = samples.len();
    let required = if config.use_intrinsic_guess {
        1
    } else {
        MIN_CHESSBOARD_VIEWS
    };
    if sample_count < required {
        return Err(CalibrationError::InsufficientData {
            required,
            available: sample_count,
        });
    }

    let target: Vec<Pt2> = samples
        .object_points()
        .iter()
        .map(|p| Pt2::new(p.x, p.y))
        .collect();
    let homographies = samples
        .samples()
        .iter()
        .map(|s| dlt_homography(&target, s))
        .collect::<Result<Vec<_>, _>>()?;

    let start = if config.use_intrinsic_guess {
        if !(current.focal_length_x() > 0.0 && current.focal_length_y() > 0.0) {
            return Err(CalibrationError::InvalidConfig(
                "intrinsic guess needs positive focal lengths".into(),
            ));
        }
        current.clone()
    } else {
        closed_form_start(&homographies, config, current.distortion().iters)?
    };

    let kmtx = *start.camera_mat();
    let poses = homographies
        .iter()
        .map(|h| {
            estimate_planar_pose_from_h(&kmtx, h)
                .map(|iso| RvecExtrinsics::new(iso.rotation.scaled_axis(), iso.translation.vector))
        })
        .collect::<Result<Vec<_>, _>>()?;

    info!(
        "chessboard calibration: {sample_count} samples of {}x{}",
        samples.grid_size().0,
        samples.grid_size().1
    );
    let solution = optimize_planar_intrinsics(
        &start,
        samples.views(),
        &poses,
        config.intrinsic_fix,
        config.covariance(),
        &config.library_solver,
    )
    .map_err(|e| {
        warn!("chessboard calibration failed: {e:#}");
        CalibrationError::ExternalLibrary(format!("{e:#}"))
    })?;

    Ok(IntrinsicsPass {
        intrinsics: solution.intrinsics,
        report: IntrinsicsReport {
            rms: solution.rms,
            initial_rms: solution.initial_rms,
            converged: solution.report.converged,
            iterations: solution.report.iterations,
            sample_count,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(offset: Real) -> Vec<Pt2> {
        ChessboardSamples::new(3, 2)
            .object_points()
            .iter()
            .map(|p| Pt2::new(100.0 + 40.0 * p.x + offset, 80.0 + 40.0 * p.y))
            .collect()
    }

    #[test]
    fn object_points_run_along_rows() {
        let pts = ChessboardSamples::new(3, 2).object_points();
        assert_eq!(pts.len(), 6);
        assert_eq!(pts[1], Pt3::new(1.0, 0.0, 0.0));
        assert_eq!(pts[3], Pt3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn near_duplicates_are_skipped() {
        let mut samples = ChessboardSamples::new(3, 2);
        assert!(samples.add(3, 2, sample(0.0), 500.0).unwrap());
        // every corner 20 px away: mean squared offset 400
        assert!(!samples.add(3, 2, sample(20.0), 500.0).unwrap());
        // 25 px: 625
        assert!(samples.add(3, 2, sample(25.0), 500.0).unwrap());
        assert_eq!(samples.len(), 2);
        // zero threshold keeps even an exact repeat
        assert!(samples.add(3, 2, sample(0.0), 0.0).unwrap());
    }

    #[test]
    fn wrong_corner_count_is_an_error() {
        let mut samples = ChessboardSamples::new(3, 2);
        let mut corners = sample(0.0);
        corners.pop();
        assert!(matches!(
            samples.add(3, 2, corners, 500.0),
            Err(CalibrationError::InvalidSample(_))
        ));
        assert!(samples.is_empty());
    }

    #[test]
    fn grid_change_drops_old_samples() {
        let mut samples = ChessboardSamples::new(3, 2);
        samples.add(3, 2, sample(0.0), 500.0).unwrap();
        let corners: Vec<Pt2> = (0..4).map(|i| Pt2::new(i as Real * 50.0, 10.0)).collect();
        assert!(samples.add(2, 2, corners, 500.0).unwrap());
        assert_eq!(samples.grid_size(), (2, 2));
        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn too_few_samples_is_insufficient_data() {
        let mut samples = ChessboardSamples::new(9, 6);
        let corners: Vec<Pt2> = samples
            .object_points()
            .iter()
            .map(|p| Pt2::new(50.0 * p.x, 50.0 * p.y))
            .collect();
        samples.add(9, 6, corners, 500.0).unwrap();
        let err = calibrate_chessboard_intrinsics(
            &PinholeIntrinsics::default(),
            &samples,
            &CalibrationConfig::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            CalibrationError::InsufficientData {
                required: 3,
                available: 1
            }
        );
    }
}
