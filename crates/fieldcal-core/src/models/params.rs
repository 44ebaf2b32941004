use serde::{Deserialize, Serialize};

use super::{
    BrownConrady5, CameraModel, PinholeCamera, PinholeIntrinsics, QuaternionCamera,
    QuaternionExtrinsics, RvecExtrinsics, SimpleIntrinsics,
};
use crate::{Real, Vec3};

/// Serializable camera model snapshot.
///
/// Runtime models keep derived caches private; this is the plain-data form
/// used for JSON input/output and for building a runtime [`CameraModel`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CameraModelParams {
    /// Single focal length, odd radial distortion, quaternion orientation.
    Quaternion {
        focal_length: Real,
        principal_point_x: Real,
        principal_point_y: Real,
        distortion: Real,
        /// Field-to-camera rotation `[x, y, z, w]`, normalised on use.
        q: [Real; 4],
        t: [Real; 3],
    },
    /// Pinhole intrinsics, Brown–Conrady distortion, rotation-vector pose.
    Pinhole {
        fx: Real,
        fy: Real,
        cx: Real,
        cy: Real,
        #[serde(default)]
        distortion: BrownConrady5,
        rvec: [Real; 3],
        tvec: [Real; 3],
    },
}

impl Default for CameraModelParams {
    fn default() -> Self {
        Self::from(&CameraModel::default())
    }
}

impl CameraModelParams {
    /// Build the runtime model, computing derived caches.
    pub fn build(&self) -> CameraModel {
        match self {
            Self::Quaternion {
                focal_length,
                principal_point_x,
                principal_point_y,
                distortion,
                q,
                t,
            } => CameraModel::Quaternion(QuaternionCamera::new(
                SimpleIntrinsics::new(
                    *focal_length,
                    *principal_point_x,
                    *principal_point_y,
                    *distortion,
                ),
                QuaternionExtrinsics::new(*q, Vec3::from(*t)),
            )),
            Self::Pinhole {
                fx,
                fy,
                cx,
                cy,
                distortion,
                rvec,
                tvec,
            } => CameraModel::Pinhole(PinholeCamera::new(
                PinholeIntrinsics::new(*fx, *fy, *cx, *cy, *distortion),
                RvecExtrinsics::new(Vec3::from(*rvec), Vec3::from(*tvec)),
            )),
        }
    }
}

impl From<&CameraModel> for CameraModelParams {
    fn from(model: &CameraModel) -> Self {
        match model {
            CameraModel::Quaternion(cam) => {
                let pp = cam.intrinsics.principal_point();
                Self::Quaternion {
                    focal_length: cam.intrinsics.focal_length(),
                    principal_point_x: pp.x,
                    principal_point_y: pp.y,
                    distortion: cam.intrinsics.distortion(),
                    q: cam.extrinsics.raw_quaternion(),
                    t: cam.extrinsics.translation().into(),
                }
            }
            CameraModel::Pinhole(cam) => {
                let pp = cam.intrinsics.principal_point();
                Self::Pinhole {
                    fx: cam.intrinsics.focal_length_x(),
                    fy: cam.intrinsics.focal_length_y(),
                    cx: pp.x,
                    cy: pp.y,
                    distortion: *cam.intrinsics.distortion(),
                    rvec: cam.extrinsics.rvec().into(),
                    tvec: cam.extrinsics.tvec().into(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CameraModelKind, FieldProjection, Pt3};

    #[test]
    fn default_params_build_default_model() {
        let model = CameraModelParams::default().build();
        assert_eq!(model, CameraModel::default());
        assert_eq!(model.kind(), CameraModelKind::Quaternion);
    }

    #[test]
    fn snapshot_roundtrip_preserves_projection() {
        let params = CameraModelParams::Pinhole {
            fx: 800.0,
            fy: 790.0,
            cx: 640.0,
            cy: 360.0,
            distortion: BrownConrady5::default(),
            rvec: [3.0, 0.1, 0.0],
            tvec: [10.0, 20.0, 3000.0],
        };
        let model = params.build();
        let again = CameraModelParams::from(&model).build();
        let p = Pt3::new(150.0, -80.0, 0.0);
        assert_eq!(model.field_to_image(&p), again.field_to_image(&p));
    }

    #[test]
    fn quaternion_params_serde_shape() {
        let json = r#"{
            "type": "quaternion",
            "focal_length": 520.0,
            "principal_point_x": 390.0,
            "principal_point_y": 290.0,
            "distortion": 0.1,
            "q": [0.7, -0.7, 0.0, 0.0],
            "t": [0.0, 1250.0, 3500.0]
        }"#;
        let params: CameraModelParams = serde_json::from_str(json).expect("serde should succeed");
        match params.build() {
            CameraModel::Quaternion(cam) => {
                assert_eq!(cam.intrinsics.focal_length(), 520.0);
                assert_eq!(cam.intrinsics.distortion(), 0.1);
                assert_eq!(cam.extrinsics.translation().z, 3500.0);
            }
            _ => panic!("expected quaternion model"),
        }
    }

    #[test]
    fn pinhole_distortion_defaults_to_zero() {
        let json = r#"{
            "type": "pinhole",
            "fx": 1.0, "fy": 1.0, "cx": 0.0, "cy": 0.0,
            "rvec": [0.0, 0.0, 0.0], "tvec": [0.0, 0.0, 0.0]
        }"#;
        let params: CameraModelParams = serde_json::from_str(json).expect("serde should succeed");
        assert_eq!(params.build(), CameraModel::new(CameraModelKind::Pinhole));
    }
}
