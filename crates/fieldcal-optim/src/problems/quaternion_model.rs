//! Calibration of the quaternion camera model from corners and line
//! segment observations.
//!
//! Residuals are pixel errors scaled by `1/sqrt(cov)` per axis. Corner rows
//! come first, followed (in full estimation) by one row pair per detected
//! segment point whose field position is `shape.point_at(α)`. The α values
//! are appended to the camera increment after
//! [`slots::STATE_SPACE_DIMENSION`].

use anyhow::{ensure, Result};
use fieldcal_core::{
    slots, CorrespondenceStore, FieldProjection, Pt2, Pt3, QuaternionCamera, Real,
    SegmentObservation,
};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::solver::lm::IncrementalProblem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMode {
    /// Focal length, rotation and ground-plane translation from corners only.
    #[default]
    FourPointInitial,
    /// Everything above plus principal point, distortion and one α per
    /// detected segment point.
    FullEstimation,
}

/// Per-axis observation covariances (pixels²).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservationCovariance {
    pub corner_x: Real,
    pub corner_y: Real,
    pub segment_x: Real,
    pub segment_y: Real,
}

impl Default for ObservationCovariance {
    fn default() -> Self {
        Self {
            corner_x: 1.0,
            corner_y: 1.0,
            segment_x: 1.0,
            segment_y: 1.0,
        }
    }
}

impl ObservationCovariance {
    pub fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("corner_x", self.corner_x),
            ("corner_y", self.corner_y),
            ("segment_x", self.segment_x),
            ("segment_y", self.segment_y),
        ] {
            ensure!(v.is_finite() && v > 0.0, "covariance {name} must be positive, got {v}");
        }
        Ok(())
    }

    pub(crate) fn corner_scale(&self) -> [Real; 2] {
        [1.0 / self.corner_x.sqrt(), 1.0 / self.corner_y.sqrt()]
    }

    fn segment_scale(&self) -> [Real; 2] {
        [1.0 / self.segment_x.sqrt(), 1.0 / self.segment_y.sqrt()]
    }
}

/// Active increment slots for `mode`, without α slots.
pub fn camera_slots(mode: CalibrationMode, estimate_height: bool) -> Vec<usize> {
    let mut active = vec![slots::FOCAL_LENGTH];
    if mode == CalibrationMode::FullEstimation {
        active.extend([slots::PP_X, slots::PP_Y, slots::DIST]);
    }
    active.extend([slots::Q_1, slots::Q_2, slots::Q_3, slots::T_1, slots::T_2]);
    if estimate_height {
        active.push(slots::T_3);
    }
    active
}

#[derive(Debug, Clone)]
pub struct QuaternionCalibrationProblem {
    camera: QuaternionCamera,
    corners: Vec<(Pt3, Pt2)>,
    segments: Vec<SegmentObservation>,
    alphas: Vec<Real>,
    mode: CalibrationMode,
    covariance: ObservationCovariance,
    estimate_height: bool,
    flips: usize,
}

impl QuaternionCalibrationProblem {
    /// Build from explicit observations. `segments` is ignored in
    /// [`CalibrationMode::FourPointInitial`].
    pub fn new(
        camera: QuaternionCamera,
        corners: Vec<(Pt3, Pt2)>,
        segments: Vec<SegmentObservation>,
        mode: CalibrationMode,
        covariance: ObservationCovariance,
        estimate_height: bool,
    ) -> Result<Self> {
        covariance.validate()?;
        let segments = match mode {
            CalibrationMode::FourPointInitial => Vec::new(),
            CalibrationMode::FullEstimation => segments,
        };
        let alphas = segments.iter().map(|s| s.alpha).collect();
        Ok(Self {
            camera,
            corners,
            segments,
            alphas,
            mode,
            covariance,
            estimate_height,
            flips: 0,
        })
    }

    /// Take detected corners and detected segment points from `store`. The
    /// α slot count is fixed here, from the current detected flags.
    pub fn from_store(
        camera: QuaternionCamera,
        store: &CorrespondenceStore,
        mode: CalibrationMode,
        covariance: ObservationCovariance,
        estimate_height: bool,
    ) -> Result<Self> {
        let corners = store.detected_corners().map(|c| (c.field, c.image)).collect();
        Self::new(
            camera,
            corners,
            store.detected_observations(),
            mode,
            covariance,
            estimate_height,
        )
    }

    pub fn mode(&self) -> CalibrationMode {
        self.mode
    }

    pub fn camera(&self) -> &QuaternionCamera {
        &self.camera
    }

    pub fn alphas(&self) -> &[Real] {
        &self.alphas
    }

    pub fn corner_count(&self) -> usize {
        self.corners.len()
    }

    pub fn segment_point_count(&self) -> usize {
        self.segments.len()
    }

    /// Number of residual rows.
    pub fn residual_count(&self) -> usize {
        2 * (self.corners.len() + self.segments.len())
    }

    /// Number of mirror flips applied while solving.
    pub fn flips(&self) -> usize {
        self.flips
    }

    pub fn into_parts(self) -> (QuaternionCamera, Vec<Real>) {
        (self.camera, self.alphas)
    }

    fn alpha_at(&self, i: usize, delta: &DVector<Real>) -> Real {
        self.alphas[i] + delta.get(slots::STATE_SPACE_DIMENSION + i).copied().unwrap_or(0.0)
    }

    fn pixel_errors<'a>(
        &'a self,
        delta: &'a DVector<Real>,
    ) -> impl Iterator<Item = ([Real; 2], [Real; 2])> + 'a {
        let corners = self.corners.iter().map(move |(field, image)| {
            let proj = self.camera.field_to_image_with_delta(field, delta);
            ([proj.x - image.x, proj.y - image.y], self.covariance.corner_scale())
        });
        let segments = self.segments.iter().enumerate().map(move |(i, obs)| {
            let field = obs.shape.point_at(self.alpha_at(i, delta));
            let proj = self.camera.field_to_image_with_delta(&field, delta);
            ([proj.x - obs.image.x, proj.y - obs.image.y], self.covariance.segment_scale())
        });
        corners.chain(segments)
    }

    /// Weighted chi-square at the current state.
    pub fn chi2(&self) -> Real {
        self.residuals(&DVector::zeros(self.dim())).norm_squared()
    }

    /// Unweighted RMS pixel error over every residual pair.
    pub fn pixel_rmse(&self) -> Option<Real> {
        let n = self.corners.len() + self.segments.len();
        if n == 0 {
            return None;
        }
        let zero = DVector::zeros(self.dim());
        let sum: Real = self
            .pixel_errors(&zero)
            .map(|(e, _)| e[0] * e[0] + e[1] * e[1])
            .sum();
        Some((sum / n as Real).sqrt())
    }

    /// RMS pixel error of the corner correspondences alone.
    pub fn corner_rmse(&self) -> Option<Real> {
        if self.corners.is_empty() {
            return None;
        }
        let sum: Real = self
            .corners
            .iter()
            .map(|(field, image)| (self.camera.field_to_image(field) - image).norm_squared())
            .sum();
        Some((sum / self.corners.len() as Real).sqrt())
    }
}

impl IncrementalProblem for QuaternionCalibrationProblem {
    fn dim(&self) -> usize {
        slots::STATE_SPACE_DIMENSION + self.alphas.len()
    }

    fn active_slots(&self) -> Vec<usize> {
        let mut active = camera_slots(self.mode, self.estimate_height);
        active.extend((0..self.alphas.len()).map(|i| slots::STATE_SPACE_DIMENSION + i));
        active
    }

    fn residuals(&self, delta: &DVector<Real>) -> DVector<Real> {
        let mut r = DVector::zeros(self.residual_count());
        for (k, (err, scale)) in self.pixel_errors(delta).enumerate() {
            r[2 * k] = err[0] * scale[0];
            r[2 * k + 1] = err[1] * scale[1];
        }
        r
    }

    fn apply(&mut self, delta: &DVector<Real>) {
        let (camera, flipped) = self.camera.with_delta(delta);
        let alphas = (0..self.alphas.len()).map(|i| self.alpha_at(i, delta)).collect();
        self.camera = camera;
        self.alphas = alphas;
        if flipped {
            self.flips += 1;
            log::debug!("negative focal length folded back with a 180 degree flip");
        }
    }
}
