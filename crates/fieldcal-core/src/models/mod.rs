//! Camera models for overhead field cameras.
//!
//! Two interchangeable models share the [`FieldProjection`] contract:
//!
//! - [`QuaternionCamera`]: single focal length, quaternion orientation and a
//!   one-coefficient odd radial distortion with a closed-form forward map.
//! - [`PinholeCamera`]: separate focal lengths, 5-coefficient Brown–Conrady
//!   distortion and a rotation-vector pose.
//!
//! [`CameraModel`] selects between them per camera; [`CameraModelParams`] is
//! the serializable snapshot.

mod camera;
mod distortion;
mod extrinsics;
mod intrinsics;
mod params;

pub use camera::*;
pub use distortion::*;
pub use extrinsics::*;
pub use intrinsics::*;
pub use params::*;
