//! Calibration problems for the two camera models, plus multi-view
//! intrinsics from a planar target.

pub mod pinhole_model;
pub mod planar_intrinsics;
pub mod quaternion_model;

pub use pinhole_model::{optimize_pinhole, PinholeCalibrationProblem, PinholeFixFlags, PinholeSolution};
pub use planar_intrinsics::{
    optimize_planar_intrinsics, PlanarIntrinsicsProblem, PlanarIntrinsicsSolution, PlanarView,
};
pub use quaternion_model::{
    camera_slots, CalibrationMode, ObservationCovariance, QuaternionCalibrationProblem,
};
