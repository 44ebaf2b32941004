use nalgebra::{Quaternion, Rotation3};

use crate::{Mat3, Pt3, Quat, Real, Vec3};

/// Advisory `[min, max]` range for the camera height `tz`.
pub const CAMERA_HEIGHT_RANGE: (Real, Real) = (0.0, 6500.0);

const DEFAULT_Q: [Real; 4] = [0.7, -0.7, 0.0, 0.0];
const DEFAULT_T: [Real; 3] = [0.0, 1250.0, 3500.0];

/// Field-to-camera rigid transform stored as a raw quaternion and a
/// translation.
///
/// The quaternion is kept exactly as written (`q0..q3` = `x, y, z, w`) so
/// external persistence round-trips the stored scalars; every rotation use
/// goes through [`QuaternionExtrinsics::rotation`], which renormalises.
#[derive(Clone, Debug, PartialEq)]
pub struct QuaternionExtrinsics {
    q: [Real; 4],
    t: Vec3,
}

impl Default for QuaternionExtrinsics {
    fn default() -> Self {
        Self {
            q: DEFAULT_Q,
            t: Vec3::from(DEFAULT_T),
        }
    }
}

impl QuaternionExtrinsics {
    pub fn new(q: [Real; 4], t: Vec3) -> Self {
        Self { q, t }
    }

    pub fn from_rotation(rotation: &Quat, t: Vec3) -> Self {
        let mut out = Self::new([0.0, 0.0, 0.0, 1.0], t);
        out.set_rotation(rotation);
        out
    }

    /// Raw stored quaternion components `[x, y, z, w]`.
    pub fn raw_quaternion(&self) -> [Real; 4] {
        self.q
    }

    /// Unit field-to-camera rotation. A zero quaternion maps to identity.
    pub fn rotation(&self) -> Quat {
        let q = Quaternion::new(self.q[3], self.q[0], self.q[1], self.q[2]);
        if q.norm() <= Real::EPSILON {
            return Quat::identity();
        }
        Quat::from_quaternion(q)
    }

    pub fn set_raw_quaternion(&mut self, q: [Real; 4]) {
        self.q = q;
    }

    pub fn set_rotation(&mut self, rotation: &Quat) {
        let q = rotation.quaternion();
        self.q = [q.i, q.j, q.k, q.w];
    }

    pub fn translation(&self) -> Vec3 {
        self.t
    }

    pub fn set_translation(&mut self, t: Vec3) {
        self.t = t;
    }

    /// Transform a field point into the camera frame.
    pub fn field_to_camera(&self, p: &Pt3) -> Vec3 {
        self.rotation() * p.coords + self.t
    }

    /// Inverse rotation matrix (camera to field).
    pub fn rotation_mat_inv(&self) -> Mat3 {
        self.rotation().inverse().to_rotation_matrix().into_inner()
    }

    /// Camera centre in field coordinates, `-R^{-1} t`.
    pub fn world_location(&self) -> Pt3 {
        Pt3::from(self.rotation().inverse() * (-self.t))
    }

    /// Restore factory defaults, keeping the camera height `tz`.
    pub fn reset(&mut self) {
        let tz = self.t.z;
        *self = Self::default();
        self.t.z = tz;
    }
}

/// Field-to-camera transform as a Rodrigues rotation vector plus translation,
/// with the back-projection terms cached.
#[derive(Clone, Debug, PartialEq)]
pub struct RvecExtrinsics {
    rvec: Vec3,
    tvec: Vec3,
    rotation_mat_inv: Mat3,
    right_side: Vec3,
}

impl Default for RvecExtrinsics {
    fn default() -> Self {
        Self::new(Vec3::zeros(), Vec3::zeros())
    }
}

impl RvecExtrinsics {
    pub fn new(rvec: Vec3, tvec: Vec3) -> Self {
        let mut out = Self {
            rvec,
            tvec,
            rotation_mat_inv: Mat3::identity(),
            right_side: Vec3::zeros(),
        };
        out.update_derived();
        out
    }

    pub fn rvec(&self) -> Vec3 {
        self.rvec
    }

    pub fn tvec(&self) -> Vec3 {
        self.tvec
    }

    pub fn set_rvec(&mut self, rvec: Vec3) {
        self.rvec = rvec;
        self.update_derived();
    }

    pub fn set_tvec(&mut self, tvec: Vec3) {
        self.tvec = tvec;
        self.update_derived();
    }

    pub fn set_pose(&mut self, rvec: Vec3, tvec: Vec3) {
        self.rvec = rvec;
        self.tvec = tvec;
        self.update_derived();
    }

    pub fn rotation(&self) -> Rotation3<Real> {
        Rotation3::from_scaled_axis(self.rvec)
    }

    pub fn rotation_mat_inv(&self) -> &Mat3 {
        &self.rotation_mat_inv
    }

    /// `R^{-1} t`, the camera centre negated.
    pub fn right_side(&self) -> &Vec3 {
        &self.right_side
    }

    pub fn field_to_camera(&self, p: &Pt3) -> Vec3 {
        self.rotation() * p.coords + self.tvec
    }

    pub fn world_location(&self) -> Pt3 {
        Pt3::from(-self.right_side)
    }

    pub fn update_derived(&mut self) {
        self.rotation_mat_inv = self.rotation().inverse().into_inner();
        self.right_side = self.rotation_mat_inv * self.tvec;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
