use log::warn;

use super::{BrownConrady5, OddRadial};
use crate::{Mat3, Pt2, Real};

/// Advisory `[min, max]` range for the simple model's distortion coefficient.
///
/// Setters never clamp; the range is a hint for operator tooling.
pub const DISTORTION_RANGE: (Real, Real) = (-1.0, 2.0);

fn k_matrix(fx: Real, fy: Real, cx: Real, cy: Real) -> Mat3 {
    Mat3::new(fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0)
}

fn k_inverse(k: &Mat3) -> Mat3 {
    k.try_inverse().unwrap_or_else(|| {
        warn!("camera matrix is singular, inverse cache set to zero");
        Mat3::zeros()
    })
}

/// Single-focal-length intrinsics with a one-coefficient radial distortion.
///
/// All fields are private so the cached camera matrix `K` and `K^{-1}` can
/// never disagree with the scalar coefficients: every setter recomputes them.
#[derive(Clone, Debug, PartialEq)]
pub struct SimpleIntrinsics {
    focal_length: Real,
    principal_point_x: Real,
    principal_point_y: Real,
    distortion: Real,
    camera_mat: Mat3,
    camera_mat_inv: Mat3,
}

impl Default for SimpleIntrinsics {
    fn default() -> Self {
        Self::new(500.0, 390.0, 290.0, 0.0)
    }
}

impl SimpleIntrinsics {
    pub fn new(
        focal_length: Real,
        principal_point_x: Real,
        principal_point_y: Real,
        distortion: Real,
    ) -> Self {
        let mut out = Self {
            focal_length,
            principal_point_x,
            principal_point_y,
            distortion,
            camera_mat: Mat3::identity(),
            camera_mat_inv: Mat3::identity(),
        };
        out.update_derived();
        out
    }

    pub fn focal_length(&self) -> Real {
        self.focal_length
    }

    pub fn principal_point(&self) -> Pt2 {
        Pt2::new(self.principal_point_x, self.principal_point_y)
    }

    pub fn distortion(&self) -> Real {
        self.distortion
    }

    /// Distortion model for the current coefficient.
    pub fn lens(&self) -> OddRadial {
        OddRadial {
            distortion: self.distortion,
        }
    }

    pub fn camera_mat(&self) -> &Mat3 {
        &self.camera_mat
    }

    pub fn camera_mat_inv(&self) -> &Mat3 {
        &self.camera_mat_inv
    }

    pub fn set_focal_length(&mut self, f: Real) {
        self.focal_length = f;
        self.update_derived();
    }

    pub fn set_principal_point(&mut self, x: Real, y: Real) {
        self.principal_point_x = x;
        self.principal_point_y = y;
        self.update_derived();
    }

    pub fn set_distortion(&mut self, distortion: Real) {
        self.distortion = distortion;
        self.update_derived();
    }

    /// Recompute `K` and `K^{-1}` from the scalar coefficients.
    pub fn update_derived(&mut self) {
        self.camera_mat = k_matrix(
            self.focal_length,
            self.focal_length,
            self.principal_point_x,
            self.principal_point_y,
        );
        self.camera_mat_inv = k_inverse(&self.camera_mat);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Pinhole intrinsics with separate focal lengths and a 5-coefficient
/// Brown–Conrady distortion vector.
#[derive(Clone, Debug, PartialEq)]
pub struct PinholeIntrinsics {
    focal_length_x: Real,
    focal_length_y: Real,
    principal_point_x: Real,
    principal_point_y: Real,
    distortion: BrownConrady5,
    camera_mat: Mat3,
    camera_mat_inv: Mat3,
}

impl Default for PinholeIntrinsics {
    fn default() -> Self {
        Self::new(1.0, 1.0, 0.0, 0.0, BrownConrady5::default())
    }
}

impl PinholeIntrinsics {
    pub fn new(
        focal_length_x: Real,
        focal_length_y: Real,
        principal_point_x: Real,
        principal_point_y: Real,
        distortion: BrownConrady5,
    ) -> Self {
        let mut out = Self {
            focal_length_x,
            focal_length_y,
            principal_point_x,
            principal_point_y,
            distortion,
            camera_mat: Mat3::identity(),
            camera_mat_inv: Mat3::identity(),
        };
        out.update_derived();
        out
    }

    pub fn focal_length_x(&self) -> Real {
        self.focal_length_x
    }

    pub fn focal_length_y(&self) -> Real {
        self.focal_length_y
    }

    pub fn principal_point(&self) -> Pt2 {
        Pt2::new(self.principal_point_x, self.principal_point_y)
    }

    pub fn distortion(&self) -> &BrownConrady5 {
        &self.distortion
    }

    pub fn camera_mat(&self) -> &Mat3 {
        &self.camera_mat
    }

    pub fn camera_mat_inv(&self) -> &Mat3 {
        &self.camera_mat_inv
    }

    pub fn set_focal_length(&mut self, fx: Real, fy: Real) {
        self.focal_length_x = fx;
        self.focal_length_y = fy;
        self.update_derived();
    }

    pub fn set_principal_point(&mut self, x: Real, y: Real) {
        self.principal_point_x = x;
        self.principal_point_y = y;
        self.update_derived();
    }

    pub fn set_distortion(&mut self, distortion: BrownConrady5) {
        self.distortion = distortion;
        self.update_derived();
    }

    pub fn update_derived(&mut self) {
        self.camera_mat = k_matrix(
            self.focal_length_x,
            self.focal_length_y,
            self.principal_point_x,
            self.principal_point_y,
        );
        self.camera_mat_inv = k_inverse(&self.camera_mat);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_defaults() {
        let k = SimpleIntrinsics::default();
        assert_eq!(k.focal_length(), 500.0);
        assert_eq!(k.principal_point(), Pt2::new(390.0, 290.0));
        assert_eq!(k.distortion(), 0.0);
    }

    #[test]
    fn setters_keep_camera_matrix_consistent() {
        let mut k = SimpleIntrinsics::default();
        k.set_focal_length(640.0);
        k.set_principal_point(320.0, 240.0);
        assert_eq!(k.camera_mat()[(0, 0)], 640.0);
        assert_eq!(k.camera_mat()[(1, 1)], 640.0);
        assert_eq!(k.camera_mat()[(0, 2)], 320.0);
        assert_eq!(k.camera_mat()[(1, 2)], 240.0);
        let eye = k.camera_mat() * k.camera_mat_inv();
        assert!((eye - Mat3::identity()).norm() < 1e-12);
    }

    #[test]
    fn update_derived_is_idempotent() {
        let mut k = PinholeIntrinsics::new(800.0, 780.0, 640.0, 360.0, BrownConrady5::default());
        let before = k.clone();
        k.update_derived();
        k.update_derived();
        assert_eq!(k, before);
    }

    #[test]
    fn pinhole_reset_restores_defaults() {
        let mut k = PinholeIntrinsics::new(
            800.0,
            780.0,
            640.0,
            360.0,
            BrownConrady5::from_coeffs([0.1, 0.0, 0.0, 0.0, 0.0], 0),
        );
        k.reset();
        assert_eq!(k, PinholeIntrinsics::default());
        assert_eq!(*k.camera_mat(), Mat3::identity());
    }

    #[test]
    fn singular_focal_length_does_not_panic() {
        let mut k = SimpleIntrinsics::default();
        k.set_focal_length(0.0);
        assert_eq!(*k.camera_mat_inv(), Mat3::zeros());
    }
}
