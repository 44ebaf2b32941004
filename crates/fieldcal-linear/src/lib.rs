//! Closed-form initialisers for field camera calibration.
//!
//! - [`dlt_homography`]: Hartley-normalised DLT homography, field plane to image,
//! - [`estimate_planar_pose_from_h`]: field-to-camera pose from a homography
//!   and known intrinsics,
//! - [`focal_from_homography`]: single-view focal length with known principal
//!   point and square pixels,
//! - [`estimate_intrinsics_from_homographies`]: Zhang's multi-view camera
//!   matrix from views of a planar target.
//!
//! These give the non-linear solvers a starting point when the camera model
//! still holds factory defaults.

mod focal;
mod homography;
pub mod math;
mod planar_pose;
mod zhang;

pub use focal::*;
pub use homography::*;
pub use planar_pose::*;
pub use zhang::*;
