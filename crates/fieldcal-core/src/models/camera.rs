use anyhow::{bail, Result};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use super::{
    DistortionModel, OddRadial, PinholeIntrinsics, QuaternionExtrinsics, RvecExtrinsics,
    SimpleIntrinsics,
};
use crate::coordinate_utils::{distort_pixel, undistort_pixel};
use crate::{axis_angle_quaternion, ray_plane_intersect, Pt2, Pt3, Quat, Real, Vec2, Vec3};

/// Slot layout of the incremental camera parameter vector used by the
/// quaternion-model solver. Slots past [`STATE_SPACE_DIMENSION`] hold the
/// per-observation segment parameters.
pub mod slots {
    pub const FOCAL_LENGTH: usize = 0;
    pub const PP_X: usize = 1;
    pub const PP_Y: usize = 2;
    pub const DIST: usize = 3;
    pub const Q_1: usize = 4;
    pub const Q_2: usize = 5;
    pub const Q_3: usize = 6;
    pub const T_1: usize = 7;
    pub const T_2: usize = 8;
    pub const T_3: usize = 9;
    pub const STATE_SPACE_DIMENSION: usize = 10;
}

/// Bidirectional mapping between field coordinates and pixels.
///
/// Implementations are read-only over the camera state, so shared references
/// may be used concurrently.
pub trait FieldProjection {
    /// Project a field point into the image (distorted pixel coordinates).
    fn field_to_image(&self, p_field: &Pt3) -> Pt2;

    /// Back-project a pixel onto the horizontal plane at height `z`.
    ///
    /// Returns `None` when the viewing ray is parallel to the plane or the
    /// camera matrix is degenerate.
    fn image_to_field(&self, p_image: &Pt2, z: Real) -> Option<Pt3>;

    /// Camera centre in field coordinates.
    fn world_location(&self) -> Pt3;

    /// Remove lens distortion from a pixel, keeping the camera matrix.
    fn undistort_pixel(&self, p_image: &Pt2) -> Pt2;

    /// Re-apply lens distortion to an ideal pixel.
    fn distort_pixel(&self, p_image: &Pt2) -> Pt2;
}

fn slot(delta: &DVector<Real>, i: usize) -> Real {
    delta.get(i).copied().unwrap_or(0.0)
}

/// Fixed 180° rotation about the camera optical axis.
pub fn optical_axis_flip() -> Quat {
    Quat::from_axis_angle(&Vec3::z_axis(), std::f64::consts::PI)
}

/// Single-focal-length camera with quaternion orientation and the closed-form
/// odd radial distortion.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QuaternionCamera {
    pub intrinsics: SimpleIntrinsics,
    pub extrinsics: QuaternionExtrinsics,
}

impl QuaternionCamera {
    pub fn new(intrinsics: SimpleIntrinsics, extrinsics: QuaternionExtrinsics) -> Self {
        Self {
            intrinsics,
            extrinsics,
        }
    }

    fn project(
        p_field: &Pt3,
        rotation: &Quat,
        translation: &Vec3,
        focal_length: Real,
        principal_point: &Pt2,
        distortion: Real,
    ) -> Pt2 {
        let p_c = rotation * p_field.coords + translation;
        let p_un = Vec2::new(p_c.x / p_c.z, p_c.y / p_c.z);
        let p_d = OddRadial { distortion }.distort(&p_un);
        principal_point + p_d * focal_length
    }

    /// Project `p_field` through the camera perturbed by the incremental
    /// parameter vector `delta` (see [`slots`]), leaving `self` untouched.
    ///
    /// The rotation slots form an axis-angle vector composed on the left of
    /// the stored rotation. Missing trailing slots count as zero.
    pub fn field_to_image_with_delta(&self, p_field: &Pt3, delta: &DVector<Real>) -> Pt2 {
        let q_delta = axis_angle_quaternion(&Vec3::new(
            slot(delta, slots::Q_1),
            slot(delta, slots::Q_2),
            slot(delta, slots::Q_3),
        ));
        let rotation = q_delta * self.extrinsics.rotation();
        let translation = self.extrinsics.translation()
            + Vec3::new(
                slot(delta, slots::T_1),
                slot(delta, slots::T_2),
                slot(delta, slots::T_3),
            );
        let pp = self.intrinsics.principal_point();
        Self::project(
            p_field,
            &rotation,
            &translation,
            self.intrinsics.focal_length() + slot(delta, slots::FOCAL_LENGTH),
            &Pt2::new(pp.x + slot(delta, slots::PP_X), pp.y + slot(delta, slots::PP_Y)),
            self.intrinsics.distortion() + slot(delta, slots::DIST),
        )
    }

    /// Camera obtained by applying an accepted increment.
    ///
    /// All scalars change together; if the focal length ends up negative the
    /// mirror solution is folded back with [`optical_axis_flip`]. The second
    /// return value reports whether that happened.
    pub fn with_delta(&self, delta: &DVector<Real>) -> (Self, bool) {
        let q_delta = axis_angle_quaternion(&Vec3::new(
            slot(delta, slots::Q_1),
            slot(delta, slots::Q_2),
            slot(delta, slots::Q_3),
        ));
        let mut rotation = q_delta * self.extrinsics.rotation();
        let translation = self.extrinsics.translation()
            + Vec3::new(
                slot(delta, slots::T_1),
                slot(delta, slots::T_2),
                slot(delta, slots::T_3),
            );
        let pp = self.intrinsics.principal_point();
        let mut focal_length = self.intrinsics.focal_length() + slot(delta, slots::FOCAL_LENGTH);

        let flipped = focal_length < 0.0;
        if flipped {
            focal_length = -focal_length;
            rotation = optical_axis_flip() * rotation;
        }

        let intrinsics = SimpleIntrinsics::new(
            focal_length,
            pp.x + slot(delta, slots::PP_X),
            pp.y + slot(delta, slots::PP_Y),
            self.intrinsics.distortion() + slot(delta, slots::DIST),
        );
        let extrinsics = QuaternionExtrinsics::from_rotation(&rotation, translation);
        (Self::new(intrinsics, extrinsics), flipped)
    }

    pub fn reset(&mut self) {
        self.intrinsics.reset();
        self.extrinsics.reset();
    }
}

impl FieldProjection for QuaternionCamera {
    fn field_to_image(&self, p_field: &Pt3) -> Pt2 {
        Self::project(
            p_field,
            &self.extrinsics.rotation(),
            &self.extrinsics.translation(),
            self.intrinsics.focal_length(),
            &self.intrinsics.principal_point(),
            self.intrinsics.distortion(),
        )
    }

    fn image_to_field(&self, p_image: &Pt2, z: Real) -> Option<Pt3> {
        let f = self.intrinsics.focal_length();
        if f.abs() <= Real::EPSILON {
            return None;
        }
        let p_d = (p_image - self.intrinsics.principal_point()) / f;
        let p_un = self.intrinsics.lens().undistort(&p_d);

        let q_inv = self.extrinsics.rotation().inverse();
        let dir = (q_inv * Vec3::new(p_un.x, p_un.y, 1.0)).normalize();
        let origin = Pt3::from(q_inv * (-self.extrinsics.translation()));

        let t = ray_plane_intersect(&Pt3::new(0.0, 0.0, z), &Vec3::z(), &origin, &dir)?;
        Some(origin + dir * t)
    }

    fn world_location(&self) -> Pt3 {
        self.extrinsics.world_location()
    }

    fn undistort_pixel(&self, p_image: &Pt2) -> Pt2 {
        undistort_pixel(
            p_image,
            self.intrinsics.camera_mat(),
            self.intrinsics.camera_mat_inv(),
            &self.intrinsics.lens(),
        )
    }

    fn distort_pixel(&self, p_image: &Pt2) -> Pt2 {
        distort_pixel(
            p_image,
            self.intrinsics.camera_mat(),
            self.intrinsics.camera_mat_inv(),
            &self.intrinsics.lens(),
        )
    }
}

/// Pinhole camera with Brown–Conrady distortion and rotation-vector pose.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PinholeCamera {
    pub intrinsics: PinholeIntrinsics,
    pub extrinsics: RvecExtrinsics,
}

impl PinholeCamera {
    pub fn new(intrinsics: PinholeIntrinsics, extrinsics: RvecExtrinsics) -> Self {
        Self {
            intrinsics,
            extrinsics,
        }
    }

    /// Project a point already expressed in the camera frame.
    pub fn project_point_c(&self, p_c: &Vec3) -> Pt2 {
        let n_u = Vec2::new(p_c.x / p_c.z, p_c.y / p_c.z);
        let n_d = self.intrinsics.distortion().distort(&n_u);
        let k = self.intrinsics.camera_mat();
        Pt2::new(
            k[(0, 0)] * n_d.x + k[(0, 2)],
            k[(1, 1)] * n_d.y + k[(1, 2)],
        )
    }

    pub fn reset(&mut self) {
        self.intrinsics.reset();
        self.extrinsics.reset();
    }
}

impl FieldProjection for PinholeCamera {
    fn field_to_image(&self, p_field: &Pt3) -> Pt2 {
        self.project_point_c(&self.extrinsics.field_to_camera(p_field))
    }

    fn image_to_field(&self, p_image: &Pt2, z: Real) -> Option<Pt3> {
        if self.intrinsics.camera_mat_inv()[(2, 2)] == 0.0 {
            return None;
        }
        let n_d = crate::coordinate_utils::pixel_to_normalized(
            p_image,
            self.intrinsics.camera_mat_inv(),
        );
        let n_u = self.intrinsics.distortion().undistort(&n_d);

        let left = self.extrinsics.rotation_mat_inv() * Vec3::new(n_u.x, n_u.y, 1.0);
        if left.z.abs() <= Real::EPSILON {
            return None;
        }
        let right_side = self.extrinsics.right_side();
        let s = (z + right_side.z) / left.z;
        Some(Pt3::from(left * s - right_side))
    }

    fn world_location(&self) -> Pt3 {
        self.extrinsics.world_location()
    }

    fn undistort_pixel(&self, p_image: &Pt2) -> Pt2 {
        undistort_pixel(
            p_image,
            self.intrinsics.camera_mat(),
            self.intrinsics.camera_mat_inv(),
            self.intrinsics.distortion(),
        )
    }

    fn distort_pixel(&self, p_image: &Pt2) -> Pt2 {
        distort_pixel(
            p_image,
            self.intrinsics.camera_mat(),
            self.intrinsics.camera_mat_inv(),
            self.intrinsics.distortion(),
        )
    }
}

/// Per-camera choice of projection model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraModelKind {
    #[default]
    Quaternion,
    Pinhole,
}

/// Camera model selected per camera; both variants share the
/// [`FieldProjection`] contract.
#[derive(Clone, Debug, PartialEq)]
pub enum CameraModel {
    Quaternion(QuaternionCamera),
    Pinhole(PinholeCamera),
}

impl Default for CameraModel {
    fn default() -> Self {
        Self::new(CameraModelKind::default())
    }
}

const QUATERNION_SCALARS: [&str; 11] = [
    "focal_length",
    "principal_point_x",
    "principal_point_y",
    "distortion",
    "q0",
    "q1",
    "q2",
    "q3",
    "tx",
    "ty",
    "tz",
];

const PINHOLE_SCALARS: [&str; 15] = [
    "focal_length_x",
    "focal_length_y",
    "principal_point_x",
    "principal_point_y",
    "k1",
    "k2",
    "p1",
    "p2",
    "k3",
    "rvec_x",
    "rvec_y",
    "rvec_z",
    "tvec_x",
    "tvec_y",
    "tvec_z",
];

impl CameraModel {
    /// Model with factory defaults for `kind`.
    pub fn new(kind: CameraModelKind) -> Self {
        match kind {
            CameraModelKind::Quaternion => Self::Quaternion(QuaternionCamera::default()),
            CameraModelKind::Pinhole => Self::Pinhole(PinholeCamera::default()),
        }
    }

    pub fn kind(&self) -> CameraModelKind {
        match self {
            Self::Quaternion(_) => CameraModelKind::Quaternion,
            Self::Pinhole(_) => CameraModelKind::Pinhole,
        }
    }

    pub fn reset(&mut self) {
        match self {
            Self::Quaternion(cam) => cam.reset(),
            Self::Pinhole(cam) => cam.reset(),
        }
    }

    /// Named scalars in a stable order, for an external load/save hook.
    pub fn scalars(&self) -> Vec<(&'static str, Real)> {
        match self {
            Self::Quaternion(cam) => {
                let pp = cam.intrinsics.principal_point();
                let q = cam.extrinsics.raw_quaternion();
                let t = cam.extrinsics.translation();
                let values = [
                    cam.intrinsics.focal_length(),
                    pp.x,
                    pp.y,
                    cam.intrinsics.distortion(),
                    q[0],
                    q[1],
                    q[2],
                    q[3],
                    t.x,
                    t.y,
                    t.z,
                ];
                QUATERNION_SCALARS.into_iter().zip(values).collect()
            }
            Self::Pinhole(cam) => {
                let pp = cam.intrinsics.principal_point();
                let d = cam.intrinsics.distortion().coeffs();
                let r = cam.extrinsics.rvec();
                let t = cam.extrinsics.tvec();
                let values = [
                    cam.intrinsics.focal_length_x(),
                    cam.intrinsics.focal_length_y(),
                    pp.x,
                    pp.y,
                    d[0],
                    d[1],
                    d[2],
                    d[3],
                    d[4],
                    r.x,
                    r.y,
                    r.z,
                    t.x,
                    t.y,
                    t.z,
                ];
                PINHOLE_SCALARS.into_iter().zip(values).collect()
            }
        }
    }

    /// Write one named scalar; derived caches are refreshed.
    pub fn set_scalar(&mut self, name: &str, value: Real) -> Result<()> {
        match self {
            Self::Quaternion(cam) => {
                let k = &mut cam.intrinsics;
                let e = &mut cam.extrinsics;
                let pp = k.principal_point();
                let mut q = e.raw_quaternion();
                let mut t = e.translation();
                match name {
                    "focal_length" => k.set_focal_length(value),
                    "principal_point_x" => k.set_principal_point(value, pp.y),
                    "principal_point_y" => k.set_principal_point(pp.x, value),
                    "distortion" => k.set_distortion(value),
                    "q0" | "q1" | "q2" | "q3" => {
                        let idx = usize::from(name.as_bytes()[1] - b'0');
                        q[idx] = value;
                        e.set_raw_quaternion(q);
                    }
                    "tx" | "ty" | "tz" => {
                        let idx = usize::from(name.as_bytes()[1] - b'x');
                        t[idx] = value;
                        e.set_translation(t);
                    }
                    _ => bail!("unknown quaternion camera scalar '{name}'"),
                }
            }
            Self::Pinhole(cam) => {
                let k = &mut cam.intrinsics;
                let e = &mut cam.extrinsics;
                let pp = k.principal_point();
                let (fx, fy) = (k.focal_length_x(), k.focal_length_y());
                let mut d = k.distortion().coeffs();
                let iters = k.distortion().iters;
                let mut r = e.rvec();
                let mut t = e.tvec();
                match name {
                    "focal_length_x" => k.set_focal_length(value, fy),
                    "focal_length_y" => k.set_focal_length(fx, value),
                    "principal_point_x" => k.set_principal_point(value, pp.y),
                    "principal_point_y" => k.set_principal_point(pp.x, value),
                    "k1" | "k2" | "p1" | "p2" | "k3" => {
                        let idx = match name {
                            "k1" => 0,
                            "k2" => 1,
                            "p1" => 2,
                            "p2" => 3,
                            _ => 4,
                        };
                        d[idx] = value;
                        k.set_distortion(super::BrownConrady5::from_coeffs(d, iters));
                    }
                    "rvec_x" | "rvec_y" | "rvec_z" => {
                        r[usize::from(name.as_bytes()[5] - b'x')] = value;
                        e.set_rvec(r);
                    }
                    "tvec_x" | "tvec_y" | "tvec_z" => {
                        t[usize::from(name.as_bytes()[5] - b'x')] = value;
                        e.set_tvec(t);
                    }
                    _ => bail!("unknown pinhole camera scalar '{name}'"),
                }
            }
        }
        Ok(())
    }
}

impl FieldProjection for CameraModel {
    fn field_to_image(&self, p_field: &Pt3) -> Pt2 {
        match self {
            Self::Quaternion(cam) => cam.field_to_image(p_field),
            Self::Pinhole(cam) => cam.field_to_image(p_field),
        }
    }

    fn image_to_field(&self, p_image: &Pt2, z: Real) -> Option<Pt3> {
        match self {
            Self::Quaternion(cam) => cam.image_to_field(p_image, z),
            Self::Pinhole(cam) => cam.image_to_field(p_image, z),
        }
    }

    fn world_location(&self) -> Pt3 {
        match self {
            Self::Quaternion(cam) => cam.world_location(),
            Self::Pinhole(cam) => cam.world_location(),
        }
    }

    fn undistort_pixel(&self, p_image: &Pt2) -> Pt2 {
        match self {
            Self::Quaternion(cam) => cam.undistort_pixel(p_image),
            Self::Pinhole(cam) => cam.undistort_pixel(p_image),
        }
    }

    fn distort_pixel(&self, p_image: &Pt2) -> Pt2 {
        match self {
            Self::Quaternion(cam) => cam.distort_pixel(p_image),
            Self::Pinhole(cam) => cam.distort_pixel(p_image),
        }
    }
}
