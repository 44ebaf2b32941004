//! High-level entry crate for the `fieldcal` toolbox.
//!
//! `fieldcal` calibrates overhead cameras looking down at a playing field.
//! Each camera is calibrated from two kinds of correspondences:
//!
//! - **corners**: a pixel paired with a known field point, e.g. the
//!   intersection of two field lines,
//! - **segment observations**: a pixel known to lie somewhere on a field line
//!   or arc; its position along the marking is estimated with the camera.
//!
//! Two camera models are supported, selected per camera by
//! [`CalibrationConfig::model`](pipeline::CalibrationConfig):
//!
//! - the quaternion model (single focal length, one radial distortion
//!   coefficient) solved by a damped Gauss-Newton loop over corners and
//!   segments,
//! - the pinhole model (separate focal lengths, Brown-Conrady distortion)
//!   solved by a Levenberg-Marquardt library backend over corners only.
//!
//! Pinhole intrinsics can also be calibrated beforehand from several
//! chessboard views with [`CameraParameters::add_chessboard`](pipeline::CameraParameters::add_chessboard)
//! and [`CameraParameters::calibrate_intrinsics`](pipeline::CameraParameters::calibrate_intrinsics).
//!
//! ## Typical workflow
//!
//! ```no_run
//! use fieldcal::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let camera = CameraParameters::new(0, CameraModelKind::Quaternion);
//! camera.define_segments(&FieldGeometry::default());
//! camera.with_store(|store| {
//!     store.add_corner(Pt2::new(102.0, 88.0), Pt3::new(-6710.0, 4495.0, 0.0));
//!     // ... three more corners and the segment observations
//! });
//!
//! // Pose and focal length from the corners first
//! let coarse = camera.calibrate(CalibrationMode::FourPointInitial)?;
//! println!("four-point rmse {:.2} px", coarse.rmse);
//!
//! // Then every intrinsic together with the positions along the markings
//! let full = camera.calibrate(CalibrationMode::FullEstimation)?;
//! println!("full rmse {:.2} px after {} iterations", full.rmse, full.iterations);
//!
//! // Project a field point and publish the geometry record
//! let pixel = camera.field_to_image(&Pt3::new(0.0, 0.0, 0.0));
//! let record = camera.to_geometry();
//! println!("centre spot at {pixel:?}, camera at z = {:.0}", record.derived_camera_world_tz);
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate layout
//!
//! - [`core`]: math aliases, camera models, correspondence store
//! - [`linear`]: field-plane homography, focal length and pose from it,
//!   multi-view camera matrix
//! - [`optim`]: the Gauss-Newton solver, both calibration problems and the
//!   multi-view chessboard problem
//! - [`pipeline`]: the per-camera aggregate, configuration and field markings

/// Math types, camera models and the correspondence store.
pub mod core {
    pub use fieldcal_core::*;
}

/// Closed-form initialisation from the field-plane homography.
pub mod linear {
    pub use fieldcal_linear::*;
}

/// Non-linear least-squares problems and solvers.
pub mod optim {
    pub use fieldcal_optim::*;
}

/// Per-camera calibration, configuration, field geometry and corner harvesting.
pub mod pipeline {
    pub use fieldcal_pipeline::*;
}

/// Convenient re-exports for common use cases.
///
/// Import with `use fieldcal::prelude::*;` to get started quickly.
pub mod prelude {
    // Common types
    pub use crate::core::{
        CameraModel, CameraModelKind, CameraModelParams, CornerSource, CorrespondenceStore,
        FieldProjection, PinholeCamera, Pt2, Pt3, QuaternionCamera, Real, SegmentId,
        SegmentShape, Vec3,
    };

    // Calibration
    pub use crate::pipeline::{
        CalibrationConfig, CalibrationError, CalibrationMode, CalibrationReport,
        CameraParameters, DetectedFieldLine, FieldGeometry, GeometryCameraCalibration,
        IntrinsicsReport,
    };
}
