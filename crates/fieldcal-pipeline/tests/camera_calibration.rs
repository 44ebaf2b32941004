//! End-to-end calibration through the per-camera aggregate.

use std::sync::Arc;
use std::thread;

use fieldcal_core::synthetic::field::{field_scene, populate_store};
use fieldcal_core::synthetic::noise::GaussianPixelNoise;
use fieldcal_core::{
    slots, CameraModel, CameraModelKind, CornerSource, FieldProjection, PinholeCamera,
    PinholeIntrinsics, Pt2, Pt3, Quat, QuaternionCamera, Real, RvecExtrinsics, SegmentId, Vec3,
};
use fieldcal_pipeline::{
    CalibrationConfig, CalibrationError, CalibrationMode, CameraParameters, DetectedFieldLine,
    FieldGeometry,
};
use nalgebra::DVector;

/// Factory-default quaternion camera moved by a small increment.
fn ground_truth(distortion: Real) -> QuaternionCamera {
    let mut delta = DVector::zeros(slots::STATE_SPACE_DIMENSION);
    delta[slots::FOCAL_LENGTH] = 20.0;
    delta[slots::DIST] = distortion;
    delta[slots::Q_1] = 0.04;
    delta[slots::Q_2] = -0.02;
    delta[slots::Q_3] = 0.03;
    delta[slots::T_1] = 100.0;
    delta[slots::T_2] = -150.0;
    QuaternionCamera::default().with_delta(&delta).0
}

fn populated(gt: &QuaternionCamera, sigma_px: Real) -> CameraParameters {
    let params = CameraParameters::new(0, CameraModelKind::Quaternion);
    let scene = field_scene(3000.0, 2000.0, 400.0);
    params.with_store(|store| {
        populate_store(store, &scene, gt, 6, &GaussianPixelNoise { seed: 11, sigma_px });
    });
    params
}

#[test]
fn four_point_then_full_estimation() {
    let gt = ground_truth(0.03);
    let params = populated(&gt, 0.3);

    let coarse = params.calibrate(CalibrationMode::FourPointInitial).unwrap();
    assert_eq!(coarse.alpha_count, 0);
    assert_eq!(coarse.corner_count, 4);
    assert!(coarse.final_chi2 <= coarse.initial_chi2);

    let full = params.calibrate(CalibrationMode::FullEstimation).unwrap();
    assert_eq!(full.alpha_count, 42);
    assert!(full.final_chi2 <= full.initial_chi2);
    assert!(full.rmse < 0.8, "rmse {}", full.rmse);
    assert!(full.outcome.is_some());

    let CameraModel::Quaternion(cam) = params.model() else {
        panic!("model kind changed");
    };
    let f_rel = (cam.intrinsics.focal_length() - gt.intrinsics.focal_length()).abs()
        / gt.intrinsics.focal_length();
    assert!(f_rel < 0.03, "focal length relative error {f_rel}");
    let dist_err = (cam.intrinsics.distortion() - gt.intrinsics.distortion()).abs();
    assert!(dist_err < 0.02, "distortion error {dist_err}");
    // camera height is not estimated by default
    assert_eq!(cam.extrinsics.translation().z, gt.extrinsics.translation().z);

    // the estimated segment parameters were stored and diagnostics refreshed
    params.with_store(|store| {
        assert!(store.segments().iter().flat_map(|s| &s.points).all(|p| p.alpha.is_some()));
    });
    let diag = params.calibration_data_points_rmse().unwrap();
    assert!(diag < 2.0, "data point rmse {diag}");
}

#[test]
fn undetected_observations_get_no_parameter() {
    let gt = ground_truth(0.0);
    let params = populated(&gt, 0.0);
    params.calibrate(CalibrationMode::FourPointInitial).unwrap();

    params.with_store(|store| {
        store.set_observation_detected(SegmentId(0), 0, false).unwrap();
        store.set_observation_detected(SegmentId(5), 3, false).unwrap();
    });
    let report = params.calibrate(CalibrationMode::FullEstimation).unwrap();
    assert_eq!(report.alpha_count, 40);
    params.with_store(|store| {
        let seg = store.segment(SegmentId(0)).unwrap();
        assert_eq!(seg.points[0].alpha, None);
        assert!(seg.points[1].alpha.is_some());
        assert_eq!(store.detected_point_count(), 40);
    });

    // re-enabling the point brings its slot back on the next pass
    params.with_store(|store| store.set_observation_detected(SegmentId(0), 0, true).unwrap());
    let report = params.calibrate(CalibrationMode::FullEstimation).unwrap();
    assert_eq!(report.alpha_count, 41);
}

#[test]
fn failures_leave_the_model_alone() {
    let gt = ground_truth(0.0);
    let params = populated(&gt, 0.0);
    let before = params.model();

    params.set_config(CalibrationConfig {
        cov_corner_y: 0.0,
        ..params.config()
    });
    let err = params.calibrate(CalibrationMode::FourPointInitial).unwrap_err();
    assert!(matches!(err, CalibrationError::InvalidConfig(_)));
    assert_eq!(params.model(), before);

    params.set_config(CalibrationConfig::default());
    params.with_store(|store| {
        for i in 1..4 {
            store.set_corner_detected(i, false).unwrap();
        }
    });
    let report = params.calibrate_reporting(CalibrationMode::FourPointInitial);
    assert_eq!(report.rmse, -1.0);
    assert_eq!(params.model(), before);
}

#[test]
fn readers_see_whole_models_only() {
    let gt = ground_truth(0.0);
    let params = Arc::new(populated(&gt, 0.0));
    let sample_point = Pt3::new(700.0, -400.0, 0.0);
    let before = params.field_to_image(&sample_point);

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let params = Arc::clone(&params);
            thread::spawn(move || {
                (0..200)
                    .map(|_| params.model().field_to_image(&sample_point))
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    params.calibrate(CalibrationMode::FourPointInitial).unwrap();
    let after = params.field_to_image(&sample_point);

    for reader in readers {
        for seen in reader.join().unwrap() {
            assert!(seen == before || seen == after, "partial model observed: {seen:?}");
        }
    }
}

#[test]
fn harvested_corners_calibrate_the_camera() {
    let gt = ground_truth(0.0);
    let field = FieldGeometry::rectangle(3000.0, 2000.0, 0.0);
    let lines: Vec<DetectedFieldLine> = [
        "TopTouchLine",
        "BottomTouchLine",
        "LeftGoalLine",
        "RightGoalLine",
        "HalfwayLine",
    ]
    .iter()
    .map(|name| {
        let line = field.line(name).unwrap();
        let seg = line.segment();
        DetectedFieldLine::new(
            line,
            gt.field_to_image(&seg.point_at(0.3)),
            gt.field_to_image(&seg.point_at(0.6)),
        )
    })
    .collect();

    let params = CameraParameters::new(1, CameraModelKind::Quaternion);
    assert_eq!(params.detect_calibration_corners(&lines), 6);
    // harvesting twice replaces the earlier corners
    assert_eq!(params.detect_calibration_corners(&lines), 6);
    params.with_store(|store| {
        assert_eq!(store.corners().len(), 6);
        assert!(store.corners().iter().all(|c| c.source == CornerSource::Detected));
    });

    let report = params.calibrate(CalibrationMode::FourPointInitial).unwrap();
    assert!(report.rmse < 0.1, "rmse {}", report.rmse);
    assert!(report.outcome.is_some());

    params.reset();
    params.with_store(|store| assert!(store.corners().is_empty()));
}

fn pinhole_ground_truth() -> PinholeCamera {
    let look_down = Quat::from_axis_angle(&Vec3::x_axis(), std::f64::consts::PI);
    let rotation = Quat::from_axis_angle(&Vec3::x_axis(), 0.3) * look_down;
    let center = Vec3::new(300.0, -200.0, 3500.0);
    PinholeCamera::new(
        PinholeIntrinsics::new(
            600.0,
            600.0,
            390.0,
            290.0,
            fieldcal_core::BrownConrady5::from_coeffs([-0.05, 0.0, 0.0, 0.0, 0.0], 20),
        ),
        RvecExtrinsics::new(rotation.scaled_axis(), -(rotation * center)),
    )
}

#[test]
fn pinhole_model_from_factory_defaults() {
    let gt = pinhole_ground_truth();
    let config = CalibrationConfig {
        model: CameraModelKind::Pinhole,
        image_width: 780,
        image_height: 580,
        ..CalibrationConfig::default()
    };
    let params = CameraParameters::from_config(config);
    params.with_store(|store| {
        for ix in -2..=2 {
            for iy in -2..=2 {
                let p = Pt3::new(ix as Real * 750.0, iy as Real * 500.0, 0.0);
                store.add_corner(gt.field_to_image(&p), p);
            }
        }
    });

    let report = params.calibrate(CalibrationMode::FullEstimation).unwrap();
    assert_eq!(report.model_kind, CameraModelKind::Pinhole);
    assert!(report.rmse < 0.01, "rmse {}", report.rmse);

    let CameraModel::Pinhole(cam) = params.model() else {
        panic!("model kind changed");
    };
    assert!((cam.intrinsics.focal_length_x() - 600.0).abs() < 1.0);
    assert!((cam.intrinsics.distortion().k1 + 0.05).abs() < 5e-3);
    assert_eq!(cam.intrinsics.principal_point(), Pt2::new(390.0, 290.0));

    let geom = params.to_geometry();
    assert_eq!(geom.pixel_image_width, Some(780));
    let dpos = (Vec3::new(
        geom.derived_camera_world_tx,
        geom.derived_camera_world_ty,
        geom.derived_camera_world_tz,
    ) - Vec3::new(300.0, -200.0, 3500.0))
    .norm();
    assert!(dpos < 1.0, "position error {dpos}");
}
