//! Flat calibration record published to downstream consumers.

use fieldcal_core::{CameraModel, FieldProjection, Quat, Real};
use serde::{Deserialize, Serialize};

/// One camera's calibration in the shape consumers expect: a single focal
/// length and distortion coefficient, orientation as `q0..q3` (`x, y, z, w`),
/// translation, and the derived camera position in field coordinates.
///
/// For the pinhole model the x focal length and `k1` stand in for the single
/// focal length and distortion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryCameraCalibration {
    pub camera_id: usize,
    pub focal_length: Real,
    pub principal_point_x: Real,
    pub principal_point_y: Real,
    pub distortion: Real,
    pub q0: Real,
    pub q1: Real,
    pub q2: Real,
    pub q3: Real,
    pub tx: Real,
    pub ty: Real,
    pub tz: Real,
    pub derived_camera_world_tx: Real,
    pub derived_camera_world_ty: Real,
    pub derived_camera_world_tz: Real,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_image_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_image_height: Option<u32>,
}

impl GeometryCameraCalibration {
    pub fn from_model(model: &CameraModel, camera_id: usize, image_size: Option<(u32, u32)>) -> Self {
        let (focal_length, pp, distortion, rotation, t) = match model {
            CameraModel::Quaternion(cam) => (
                cam.intrinsics.focal_length(),
                cam.intrinsics.principal_point(),
                cam.intrinsics.distortion(),
                cam.extrinsics.rotation(),
                cam.extrinsics.translation(),
            ),
            CameraModel::Pinhole(cam) => (
                cam.intrinsics.focal_length_x(),
                cam.intrinsics.principal_point(),
                cam.intrinsics.distortion().k1,
                Quat::from_rotation_matrix(&cam.extrinsics.rotation()),
                cam.extrinsics.tvec(),
            ),
        };
        let q = rotation.coords;
        let world = model.world_location();
        Self {
            camera_id,
            focal_length,
            principal_point_x: pp.x,
            principal_point_y: pp.y,
            distortion,
            q0: q.x,
            q1: q.y,
            q2: q.z,
            q3: q.w,
            tx: t.x,
            ty: t.y,
            tz: t.z,
            derived_camera_world_tx: world.x,
            derived_camera_world_ty: world.y,
            derived_camera_world_tz: world.z,
            pixel_image_width: image_size.map(|(w, _)| w),
            pixel_image_height: image_size.map(|(_, h)| h),
        }
    }

    pub fn rotation(&self) -> Quat {
        Quat::from_quaternion(nalgebra::Quaternion::new(self.q3, self.q0, self.q1, self.q2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldcal_core::{CameraModelKind, PinholeCamera, PinholeIntrinsics, RvecExtrinsics, Vec3};

    #[test]
    fn quaternion_record_matches_defaults() {
        let model = CameraModel::new(CameraModelKind::Quaternion);
        let geom = GeometryCameraCalibration::from_model(&model, 3, None);
        assert_eq!(geom.camera_id, 3);
        assert_eq!(geom.focal_length, 500.0);
        assert_eq!(geom.principal_point_x, 390.0);
        assert_eq!(geom.tz, 3500.0);
        let world = model.world_location();
        assert_eq!(geom.derived_camera_world_tz, world.z);
        let json = serde_json::to_value(&geom).unwrap();
        assert!(json.get("pixel_image_width").is_none());
    }

    #[test]
    fn pinhole_rotation_is_exported_as_quaternion() {
        let rvec = Vec3::new(2.9, 0.1, -0.2);
        let model = CameraModel::Pinhole(PinholeCamera::new(
            PinholeIntrinsics::new(800.0, 810.0, 320.0, 240.0, Default::default()),
            RvecExtrinsics::new(rvec, Vec3::new(10.0, 20.0, 4000.0)),
        ));
        let geom = GeometryCameraCalibration::from_model(&model, 0, Some((640, 480)));
        assert_eq!(geom.focal_length, 800.0);
        assert_eq!(geom.pixel_image_height, Some(480));
        let expected = Quat::from_scaled_axis(rvec);
        assert!(geom.rotation().angle_to(&expected) < 1e-9);
    }
}
