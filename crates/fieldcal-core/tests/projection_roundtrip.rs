//! Field -> image -> field consistency for both camera models.

use fieldcal_core::synthetic::field::{overhead_camera, rectangle_corners};
use fieldcal_core::{
    radial_distortion, radial_distortion_inv, BrownConrady5, CameraModel, FieldProjection,
    PinholeCamera, PinholeIntrinsics, Pt3, Real, RvecExtrinsics, SimpleIntrinsics, Vec3,
};

fn field_grid() -> Vec<Pt3> {
    let mut pts = Vec::new();
    for ix in -4..=4 {
        for iy in -3..=3 {
            pts.push(Pt3::new(ix as Real * 500.0, iy as Real * 500.0, 0.0));
        }
    }
    pts
}

#[test]
fn quaternion_model_roundtrip_within_tolerance() {
    let position = Vec3::new(300.0, -150.0, 4000.0);
    for distortion in [0.0, 0.02, 0.2] {
        let cam = overhead_camera(
            position,
            0.15,
            SimpleIntrinsics::new(550.0, 390.0, 290.0, distortion),
        );
        let worst = field_grid()
            .iter()
            .map(|p| {
                let back = cam.image_to_field(&cam.field_to_image(p), 0.0).unwrap();
                (back - p).norm() / (p - Pt3::from(position)).norm()
            })
            .fold(0.0, Real::max);
        if distortion == 0.0 {
            assert!(worst < 1e-9, "worst={worst}");
        } else {
            assert!(worst < 1e-3, "distortion={distortion} worst={worst}");
        }
    }
}

#[test]
fn distortion_identity_below_epsilon() {
    for r in [0.0, 0.1, 10.0] {
        assert_eq!(radial_distortion(r, 0.0), r);
        assert_eq!(radial_distortion_inv(r, 0.0), r);
        assert_eq!(radial_distortion(r, 1e-17), r);
    }
}

#[test]
fn pinhole_model_roundtrip_on_field_corners() {
    let rvec = Vec3::new(std::f64::consts::PI, 0.0, 0.0);
    let r = nalgebra::Rotation3::from_scaled_axis(rvec);
    let centre = Vec3::new(0.0, 0.0, 5000.0);
    let model = CameraModel::Pinhole(PinholeCamera::new(
        PinholeIntrinsics::new(
            900.0,
            900.0,
            640.0,
            480.0,
            BrownConrady5::from_coeffs([-0.05, 0.0, 0.0, 0.0, 0.0], 25),
        ),
        RvecExtrinsics::new(rvec, -(r * centre)),
    ));
    for corner in rectangle_corners(6000.0, 4000.0) {
        let back = model.image_to_field(&model.field_to_image(&corner), 0.0).unwrap();
        assert!((back - corner).norm() < 1e-2, "corner={corner:?} back={back:?}");
    }
    assert!((model.world_location().coords - centre).norm() < 1e-9);
}

#[test]
fn distort_undistort_pixel_are_inverse_without_distortion() {
    let cam = overhead_camera(Vec3::new(0.0, 0.0, 4000.0), 0.0, SimpleIntrinsics::default());
    let px = fieldcal_core::Pt2::new(100.0, 50.0);
    assert!((cam.undistort_pixel(&px) - px).norm() < 1e-9);
    assert!((cam.distort_pixel(&px) - px).norm() < 1e-9);
}
