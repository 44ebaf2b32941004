//! Pinhole-model calibration through the MINPACK-style backend.

use fieldcal_core::{
    BrownConrady5, FieldProjection, PinholeCamera, PinholeIntrinsics, Pt2, Pt3, Real,
    RvecExtrinsics, Vec3,
};
use fieldcal_optim::{optimize_pinhole, ObservationCovariance, PinholeFixFlags, SolveOptions};

fn ground_truth() -> PinholeCamera {
    PinholeCamera::new(
        PinholeIntrinsics::new(
            900.0,
            905.0,
            640.0,
            480.0,
            BrownConrady5::from_coeffs([-0.08, 0.01, 0.0, 0.0, 0.0], 25),
        ),
        RvecExtrinsics::new(Vec3::new(2.85, 0.05, -0.1), Vec3::new(150.0, -900.0, 5200.0)),
    )
}

fn field_grid(cam: &PinholeCamera) -> Vec<(Pt3, Pt2)> {
    let mut out = Vec::new();
    for ix in -4..=4 {
        for iy in -3..=3 {
            let p = Pt3::new(ix as Real * 1000.0, iy as Real * 900.0, 0.0);
            out.push((p, cam.field_to_image(&p)));
        }
    }
    out
}

#[test]
fn recovers_pose_with_fixed_intrinsics() {
    let gt = ground_truth();
    let mut start = gt.clone();
    start.extrinsics.set_pose(
        gt.extrinsics.rvec() + Vec3::new(0.02, -0.015, 0.03),
        gt.extrinsics.tvec() + Vec3::new(80.0, -60.0, 150.0),
    );

    let sol = optimize_pinhole(
        &start,
        field_grid(&gt),
        PinholeFixFlags::extrinsics_only(),
        ObservationCovariance::default(),
        &SolveOptions::default(),
    )
    .unwrap();
    assert!(sol.rms < 1e-5, "rms {}", sol.rms);
    assert!((sol.camera.extrinsics.tvec() - gt.extrinsics.tvec()).norm() < 1e-3);
    assert_eq!(sol.camera.intrinsics.focal_length_x(), 900.0);
}

#[test]
fn refines_focal_length_and_radial_terms() {
    let gt = ground_truth();
    let mut start = gt.clone();
    start.intrinsics.set_focal_length(930.0, 935.0);
    start.intrinsics.set_distortion(BrownConrady5::from_coeffs([0.0; 5], 25));
    start.extrinsics.set_pose(
        gt.extrinsics.rvec() + Vec3::new(0.01, 0.01, -0.01),
        gt.extrinsics.tvec() + Vec3::new(40.0, 30.0, -50.0),
    );

    let fix = PinholeFixFlags {
        fix_principal_point: true,
        fix_tangential_distortion: true,
        fix_k3: true,
        ..PinholeFixFlags::default()
    };
    let sol = optimize_pinhole(
        &start,
        field_grid(&gt),
        fix,
        ObservationCovariance::default(),
        &SolveOptions::default(),
    )
    .unwrap();

    assert!(sol.rms < 1e-4, "rms {}", sol.rms);
    assert!((sol.camera.intrinsics.focal_length_x() - 900.0).abs() < 0.1);
    assert!((sol.camera.intrinsics.focal_length_y() - 905.0).abs() < 0.1);
    assert!((sol.camera.intrinsics.distortion().k1 + 0.08).abs() < 1e-3);
    assert_eq!(sol.camera.intrinsics.principal_point(), Pt2::new(640.0, 480.0));
}

#[test]
fn too_few_corners_is_reported() {
    let gt = ground_truth();
    let corners = field_grid(&gt).into_iter().take(3).collect();
    let res = optimize_pinhole(
        &gt,
        corners,
        PinholeFixFlags::default(),
        ObservationCovariance::default(),
        &SolveOptions::default(),
    );
    assert!(res.is_err());
}

fn x_rms(cam: &PinholeCamera, corners: &[(Pt3, Pt2)]) -> Real {
    let sum: Real = corners
        .iter()
        .map(|(p, px)| (cam.field_to_image(p).x - px.x).powi(2))
        .sum();
    (sum / corners.len() as Real).sqrt()
}

#[test]
fn loose_vertical_covariance_trusts_horizontal_coordinates() {
    let gt = ground_truth();
    // exact columns, rows biased on the right half of the field
    let corners: Vec<(Pt3, Pt2)> = field_grid(&gt)
        .into_iter()
        .map(|(p, px)| {
            let bias = if p.x > 0.0 { 4.0 } else { -1.0 };
            (p, Pt2::new(px.x, px.y + bias + 0.002 * p.x))
        })
        .collect();
    let fix = PinholeFixFlags::extrinsics_only();

    let isotropic = optimize_pinhole(
        &gt,
        corners.clone(),
        fix,
        ObservationCovariance::default(),
        &SolveOptions::default(),
    )
    .unwrap();
    let loose_y = ObservationCovariance {
        corner_x: 1.0,
        corner_y: 1e6,
        ..ObservationCovariance::default()
    };
    let anisotropic =
        optimize_pinhole(&gt, corners.clone(), fix, loose_y, &SolveOptions::default()).unwrap();

    let iso_x = x_rms(&isotropic.camera, &corners);
    let aniso_x = x_rms(&anisotropic.camera, &corners);
    assert!(aniso_x < 0.05, "horizontal rms {aniso_x}");
    assert!(aniso_x <= iso_x, "anisotropic {aniso_x} vs isotropic {iso_x}");
}
