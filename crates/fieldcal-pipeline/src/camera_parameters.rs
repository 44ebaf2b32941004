//! Per-camera calibration aggregate.
//!
//! [`CameraParameters`] owns one camera's model, its correspondence store and
//! its configuration. Projection queries only take a read lock on the model,
//! so they run concurrently with each other and with a calibration pass; a
//! pass solves on a copy and publishes the result with a single write.
//! Every writer takes the data lock before the model lock.

use fieldcal_core::{
    CameraModel, CameraModelKind, CornerSource, CorrespondenceStore, FieldProjection, Pt2, Pt3,
    Real, SegmentId,
};
use fieldcal_optim::CalibrationMode;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};

use crate::calibrate::{calibrate_pinhole, calibrate_quaternion};
use crate::chessboard::{calibrate_chessboard_intrinsics, ChessboardSamples};
use crate::corners::{harvest_corners, DetectedFieldLine};
use crate::{
    CalibrationConfig, CalibrationError, CalibrationReport, FieldGeometry,
    GeometryCameraCalibration, IntrinsicsReport,
};

#[derive(Debug, Default)]
struct CalibrationData {
    store: CorrespondenceStore,
    config: CalibrationConfig,
    chessboards: ChessboardSamples,
    /// Result of the last chessboard calibration; 0 before any, -1 after a
    /// failure.
    intrinsics_rms: Real,
}

#[derive(Debug)]
pub struct CameraParameters {
    model: RwLock<CameraModel>,
    /// Held for the whole of a calibration pass.
    data: Mutex<CalibrationData>,
}

impl Default for CameraParameters {
    fn default() -> Self {
        Self::from_config(CalibrationConfig::default())
    }
}

impl CameraParameters {
    pub fn new(camera_index: usize, kind: CameraModelKind) -> Self {
        Self::from_config(CalibrationConfig {
            model: kind,
            ..CalibrationConfig::for_camera(camera_index)
        })
    }

    pub fn from_config(config: CalibrationConfig) -> Self {
        Self {
            model: RwLock::new(CameraModel::new(config.model)),
            data: Mutex::new(CalibrationData {
                store: CorrespondenceStore::new(),
                chessboards: ChessboardSamples::new(config.grid_width, config.grid_height),
                config,
                intrinsics_rms: 0.0,
            }),
        }
    }

    pub fn camera_index(&self) -> usize {
        self.data.lock().config.camera_index
    }

    pub fn field_to_image(&self, p_field: &Pt3) -> Pt2 {
        self.model.read().field_to_image(p_field)
    }

    pub fn image_to_field(&self, p_image: &Pt2, z: Real) -> Option<Pt3> {
        self.model.read().image_to_field(p_image, z)
    }

    pub fn world_location(&self) -> Pt3 {
        self.model.read().world_location()
    }

    /// Snapshot of the current model.
    pub fn model(&self) -> CameraModel {
        self.model.read().clone()
    }

    /// Replace the model, e.g. after loading it from storage. The configured
    /// model kind follows the new model.
    pub fn set_model(&self, model: CameraModel) {
        let mut data = self.data.lock();
        data.config.model = model.kind();
        *self.model.write() = model;
    }

    pub fn scalars(&self) -> Vec<(&'static str, Real)> {
        self.model.read().scalars()
    }

    /// Edit one named model parameter. Waits for a running calibration pass
    /// to commit, so the edit is never overwritten by it.
    pub fn set_scalar(&self, name: &str, value: Real) -> anyhow::Result<()> {
        let _data = self.data.lock();
        self.model.write().set_scalar(name, value)
    }

    pub fn config(&self) -> CalibrationConfig {
        self.data.lock().config.clone()
    }

    /// Replace the configuration. Switching the model kind restarts the model
    /// from that kind's factory defaults.
    pub fn set_config(&self, config: CalibrationConfig) {
        let mut data = self.data.lock();
        let kind = config.model;
        data.config = config;
        let mut model = self.model.write();
        if model.kind() != kind {
            info!("camera {}: switching to the {kind:?} model", data.config.camera_index);
            *model = CameraModel::new(kind);
        }
    }

    /// Run `f` against the correspondence store.
    pub fn with_store<R>(&self, f: impl FnOnce(&mut CorrespondenceStore) -> R) -> R {
        f(&mut self.data.lock().store)
    }

    /// Replace the segment definitions (and their observations) with the
    /// markings of `field`.
    pub fn define_segments(&self, field: &FieldGeometry) -> Vec<SegmentId> {
        let mut data = self.data.lock();
        data.store.clear_segments();
        field
            .calibration_segments()
            .into_iter()
            .map(|shape| data.store.add_segment(shape))
            .collect()
    }

    /// Calibrate the current model against the stored correspondences.
    ///
    /// On error the model and the store are left untouched.
    pub fn calibrate(&self, mode: CalibrationMode) -> Result<CalibrationReport, CalibrationError> {
        let mut data = self.data.lock();
        self.calibrate_locked(&mut data, mode)
    }

    /// Like [`Self::calibrate`], but a failure is logged and reported with
    /// an RMS error of `-1`.
    pub fn calibrate_reporting(&self, mode: CalibrationMode) -> CalibrationReport {
        self.calibrate(mode).unwrap_or_else(|e| {
            warn!("calibration failed: {e}");
            CalibrationReport::failed(mode, self.model.read().kind())
        })
    }

    /// Mirror the configured control points into the store as corners, then
    /// calibrate.
    pub fn do_calibration(&self, mode: CalibrationMode) -> Result<CalibrationReport, CalibrationError> {
        let mut data = self.data.lock();
        let CalibrationData { store, config, .. } = &mut *data;
        store.clear_corners(CornerSource::ControlPoint);
        for cp in &config.control_points {
            store.add_corner_from(
                cp.image,
                Pt3::new(cp.field.x, cp.field.y, 0.0),
                CornerSource::ControlPoint,
            );
        }
        self.calibrate_locked(&mut data, mode)
    }

    fn calibrate_locked(
        &self,
        data: &mut CalibrationData,
        mode: CalibrationMode,
    ) -> Result<CalibrationReport, CalibrationError> {
        let start = self.model();
        let camera_index = data.config.camera_index;
        let report = match start {
            CameraModel::Quaternion(cam) => {
                let pass = calibrate_quaternion(&cam, &data.store, &data.config, mode)?;
                if mode == CalibrationMode::FullEstimation {
                    data.store.write_back_alphas(&pass.alphas)?;
                    data.store.update_calibration_data_points(&pass.camera);
                }
                *self.model.write() = CameraModel::Quaternion(pass.camera);
                pass.report
            }
            CameraModel::Pinhole(cam) => {
                let pass = calibrate_pinhole(&cam, &data.store, &data.config, mode)?;
                *self.model.write() = CameraModel::Pinhole(pass.camera);
                pass.report
            }
        };
        info!(
            "camera {camera_index}: {mode:?} calibration finished, rmse {:.3} px",
            report.rmse
        );
        Ok(report)
    }

    /// Offer the inner corners of one chessboard image, row by row, for the
    /// configured grid. Returns `Ok(false)` for a near-duplicate of an
    /// accepted sample.
    pub fn add_chessboard(&self, corners: Vec<Pt2>) -> Result<bool, CalibrationError> {
        let mut data = self.data.lock();
        let CalibrationData {
            config,
            chessboards,
            ..
        } = &mut *data;
        let added = chessboards.add(
            config.grid_width,
            config.grid_height,
            corners,
            config.corner_diff_sq_threshold,
        )?;
        if added {
            debug!(
                "camera {}: {} chessboard samples",
                config.camera_index,
                chessboards.len()
            );
        }
        Ok(added)
    }

    pub fn chessboard_count(&self) -> usize {
        self.data.lock().chessboards.len()
    }

    /// Drop every chessboard sample and zero the last intrinsic RMS.
    pub fn clear_chessboards(&self) {
        let mut data = self.data.lock();
        data.chessboards.clear();
        data.intrinsics_rms = 0.0;
    }

    /// RMS of the last chessboard calibration: 0 before any or after
    /// [`Self::clear_chessboards`], -1 after a failure.
    pub fn intrinsics_rms(&self) -> Real {
        self.data.lock().intrinsics_rms
    }

    /// Calibrate the pinhole intrinsics from the chessboard samples. The
    /// pose of the camera over the field is kept.
    ///
    /// The data lock is held for the whole solve, so samples cannot change
    /// under it. On error the model is left untouched.
    pub fn calibrate_intrinsics(&self) -> Result<IntrinsicsReport, CalibrationError> {
        let mut data = self.data.lock();
        let result = self.calibrate_intrinsics_locked(&data);
        data.intrinsics_rms = match &result {
            Ok(report) => report.rms,
            Err(_) => -1.0,
        };
        result
    }

    /// Like [`Self::calibrate_intrinsics`], but a failure is logged and
    /// reported with an RMS error of `-1`.
    pub fn calibrate_intrinsics_reporting(&self) -> IntrinsicsReport {
        self.calibrate_intrinsics().unwrap_or_else(|e| {
            warn!("chessboard calibration failed: {e}");
            IntrinsicsReport::failed(self.chessboard_count())
        })
    }

    fn calibrate_intrinsics_locked(
        &self,
        data: &CalibrationData,
    ) -> Result<IntrinsicsReport, CalibrationError> {
        let CameraModel::Pinhole(camera) = self.model() else {
            return Err(CalibrationError::InvalidConfig(
                "chessboard calibration needs the pinhole model".into(),
            ));
        };
        let pass = calibrate_chessboard_intrinsics(&camera.intrinsics, &data.chessboards, &data.config)?;
        if let CameraModel::Pinhole(current) = &mut *self.model.write() {
            current.intrinsics = pass.intrinsics;
        }
        info!(
            "camera {}: chessboard calibration over {} samples, rms {:.3} px",
            data.config.camera_index, pass.report.sample_count, pass.report.rms
        );
        Ok(pass.report)
    }

    /// Restore the model's factory defaults (keeping the camera height) and
    /// drop harvested corners and segment observations. Manual corners and
    /// segment definitions survive.
    pub fn reset(&self) {
        let mut data = self.data.lock();
        data.store.clear_corners(CornerSource::Detected);
        data.store.clear_observations();
        self.model.write().reset();
    }

    /// Refresh the per-observation diagnostics against the current model.
    pub fn update_calibration_data_points(&self) {
        let mut data = self.data.lock();
        let model = self.model.read();
        data.store.update_calibration_data_points(&*model);
    }

    pub fn calibration_data_points_rmse(&self) -> Option<Real> {
        self.data.lock().store.calibration_data_points_rmse()
    }

    /// RMS pixel error of the current model on explicit correspondences.
    ///
    /// `None` when the lists are empty or of different lengths.
    pub fn four_point_rmse(&self, field: &[Pt3], image: &[Pt2]) -> Option<Real> {
        if field.is_empty() || field.len() != image.len() {
            return None;
        }
        let model = self.model.read();
        let sum: Real = field
            .iter()
            .zip(image)
            .map(|(f, i)| (model.field_to_image(f) - i).norm_squared())
            .sum();
        Some((sum / field.len() as Real).sqrt())
    }

    /// Replace the harvested corners with intersections of `lines` and
    /// return how many were registered.
    pub fn detect_calibration_corners(&self, lines: &[DetectedFieldLine]) -> usize {
        let mut data = self.data.lock();
        let harvested = {
            let model = self.model.read();
            harvest_corners(lines, &*model, &data.config)
        };
        data.store.clear_corners(CornerSource::Detected);
        for corner in &harvested {
            data.store
                .add_corner_from(corner.image, corner.field, CornerSource::Detected);
        }
        info!(
            "camera {}: {} corners from {} detected lines",
            data.config.camera_index,
            harvested.len(),
            lines.len()
        );
        harvested.len()
    }

    pub fn to_geometry(&self) -> GeometryCameraCalibration {
        let data = self.data.lock();
        let image_size = (data.config.image_width > 0 && data.config.image_height > 0)
            .then_some((data.config.image_width, data.config.image_height));
        GeometryCameraCalibration::from_model(&self.model.read(), data.config.camera_index, image_size)
    }
}
