//! Per-camera field calibration.
//!
//! This crate ties the camera models, correspondence store and solvers into
//! one aggregate per camera:
//!
//! - [`CameraParameters`]: the camera model behind a reader/writer lock plus
//!   the store and configuration; every calibration entry point lives here,
//! - [`CalibrationConfig`]: per-camera tunables and control points,
//! - [`FieldGeometry`]: the field markings that become calibration segments,
//! - [`harvest_corners`]: corners from pairs of detected field lines,
//! - [`ChessboardSamples`]: chessboard views for multi-view calibration of the
//!   pinhole intrinsics,
//! - [`GeometryCameraCalibration`]: the flat record published downstream.
//!
//! # Example
//!
//! ```no_run
//! use fieldcal_pipeline::{CalibrationMode, CameraParameters, FieldGeometry};
//! use fieldcal_core::{CameraModelKind, Pt2, Pt3};
//!
//! let camera = CameraParameters::new(0, CameraModelKind::Quaternion);
//! camera.define_segments(&FieldGeometry::default());
//! camera.with_store(|store| {
//!     store.add_corner(Pt2::new(102.0, 88.0), Pt3::new(-6710.0, 4495.0, 0.0));
//!     // ... more corners and segment observations
//! });
//! let report = camera.calibrate(CalibrationMode::FourPointInitial)?;
//! println!("rmse {:.2} px", report.rmse);
//! # Ok::<(), fieldcal_pipeline::CalibrationError>(())
//! ```

pub mod calibrate;
mod camera_parameters;
pub mod chessboard;
pub mod config;
pub mod corners;
mod error;
pub mod field;
mod geometry;
mod report;

pub use camera_parameters::CameraParameters;
pub use chessboard::{calibrate_chessboard_intrinsics, ChessboardSamples, IntrinsicsPass};
pub use config::{generate_camera_control_points, CalibrationConfig, ControlPoint};
pub use corners::{harvest_corners, DetectedFieldLine, HarvestedCorner};
pub use error::CalibrationError;
pub use field::{FieldCircularArc, FieldGeometry, FieldLine};
pub use geometry::GeometryCameraCalibration;
pub use report::{CalibrationReport, IntrinsicsReport};

pub use fieldcal_optim::{CalibrationMode, LmOutcome};
