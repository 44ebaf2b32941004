//! Whole-camera scenario through the facade: control points, field markings,
//! two-stage calibration and the published geometry record.

use fieldcal::core::{slots, SegmentShape};
use fieldcal::prelude::*;
use nalgebra::DVector;

fn ground_truth() -> QuaternionCamera {
    let mut delta = DVector::zeros(slots::STATE_SPACE_DIMENSION);
    delta[slots::FOCAL_LENGTH] = -12.0;
    delta[slots::DIST] = 0.02;
    delta[slots::Q_2] = 0.03;
    delta[slots::T_1] = -90.0;
    delta[slots::T_2] = 120.0;
    QuaternionCamera::default().with_delta(&delta).0
}

/// Control points on the quarter-field rectangle, pixels from the true camera.
fn configured(gt: &QuaternionCamera) -> CalibrationConfig {
    let mut config = CalibrationConfig::for_camera(0);
    assert!(config.update_control_points(1, 3000.0, 2000.0));
    for cp in config.control_points.iter_mut() {
        cp.image = gt.field_to_image(&Pt3::new(cp.field.x, cp.field.y, 0.0));
    }
    config
}

fn observe_markings(camera: &CameraParameters, field: &FieldGeometry, gt: &QuaternionCamera) {
    let ids = camera.define_segments(field);
    let shapes: Vec<SegmentShape> = field.calibration_segments();
    camera.with_store(|store| {
        for (id, shape) in ids.iter().zip(&shapes) {
            for k in 1..=5 {
                let px = gt.field_to_image(&shape.point_at(k as Real / 6.0));
                store.add_segment_observation(*id, px, true).unwrap();
            }
        }
    });
}

#[test]
fn control_points_then_markings() {
    let gt = ground_truth();
    let camera = CameraParameters::from_config(configured(&gt));
    let field = FieldGeometry::rectangle(3000.0, 2000.0, 400.0);
    observe_markings(&camera, &field, &gt);

    let coarse = camera.do_calibration(CalibrationMode::FourPointInitial).unwrap();
    assert_eq!(coarse.corner_count, 4);
    assert!(coarse.final_chi2 <= coarse.initial_chi2);

    let full = camera.do_calibration(CalibrationMode::FullEstimation).unwrap();
    let points = field.calibration_segments().len() * 5;
    assert_eq!(full.alpha_count, points);
    assert!(full.rmse < 0.1, "full rmse {}", full.rmse);
    assert!(full.final_chi2 <= full.initial_chi2);

    let sample_point = Pt3::new(400.0, -300.0, 0.0);
    let err = (camera.field_to_image(&sample_point) - gt.field_to_image(&sample_point)).norm();
    assert!(err < 0.1, "projection error {err}");
    let back = camera
        .image_to_field(&camera.field_to_image(&sample_point), 0.0)
        .unwrap();
    assert!((back - sample_point).norm() < 1e-3);

    let record = camera.to_geometry();
    assert_eq!(record.camera_id, 0);
    let location = gt.world_location();
    assert!((record.derived_camera_world_tx - location.x).abs() < 5.0);
    assert!((record.derived_camera_world_ty - location.y).abs() < 5.0);
    let json = serde_json::to_string(&record).unwrap();
    assert!(!json.contains("pixel_image_width"));
}

#[test]
fn switching_models_restarts_from_defaults() {
    let gt = ground_truth();
    let camera = CameraParameters::from_config(configured(&gt));
    camera.do_calibration(CalibrationMode::FourPointInitial).unwrap();
    assert_eq!(camera.model().kind(), CameraModelKind::Quaternion);

    camera.set_config(CalibrationConfig {
        model: CameraModelKind::Pinhole,
        image_width: 780,
        image_height: 580,
        ..camera.config()
    });
    assert_eq!(camera.model(), CameraModel::new(CameraModelKind::Pinhole));

    // the control points survive the switch
    let report = camera.do_calibration(CalibrationMode::FourPointInitial).unwrap();
    assert_eq!(report.model_kind, CameraModelKind::Pinhole);
    assert_eq!(report.corner_count, 4);
}
