//! Synthetic playing-field scenes.
//!
//! A scene is the rectangle of boundary lines, the halfway line and the
//! centre circle (as two half arcs), all in the `z = 0` plane with the origin
//! at the field centre. [`populate_store`] projects it through a known
//! camera to produce corner and segment observations.

use crate::{
    CornerSource, CorrespondenceStore, FieldProjection, Pt3, Quat, QuaternionCamera,
    QuaternionExtrinsics, Real, SegmentShape, SimpleIntrinsics, Vec3,
};

use super::noise::GaussianPixelNoise;

#[derive(Clone, Debug, PartialEq)]
pub struct FieldScene {
    /// Field rectangle corners, counter-clockwise from `(-L/2, -W/2)`.
    pub corners: [Pt3; 4],
    pub segments: Vec<SegmentShape>,
}

pub fn rectangle_corners(length: Real, width: Real) -> [Pt3; 4] {
    let (hx, hy) = (0.5 * length, 0.5 * width);
    [
        Pt3::new(-hx, -hy, 0.0),
        Pt3::new(hx, -hy, 0.0),
        Pt3::new(hx, hy, 0.0),
        Pt3::new(-hx, hy, 0.0),
    ]
}

pub fn field_scene(length: Real, width: Real, center_radius: Real) -> FieldScene {
    let corners = rectangle_corners(length, width);
    let mut segments: Vec<SegmentShape> = (0..4)
        .map(|i| SegmentShape::Straight {
            p1: corners[i],
            p2: corners[(i + 1) % 4],
        })
        .collect();
    segments.push(SegmentShape::Straight {
        p1: Pt3::new(0.0, -0.5 * width, 0.0),
        p2: Pt3::new(0.0, 0.5 * width, 0.0),
    });
    if center_radius > 0.0 {
        let pi = std::f64::consts::PI;
        for (t1, t2) in [(0.0, pi), (pi, 2.0 * pi)] {
            segments.push(SegmentShape::Arc {
                center: Pt3::origin(),
                radius: center_radius,
                theta1: t1,
                theta2: t2,
            });
        }
    }
    FieldScene { corners, segments }
}

/// Quaternion camera centred at `position`, looking straight down and then
/// pitched by `tilt` radians about its own x axis.
pub fn overhead_camera(position: Vec3, tilt: Real, intrinsics: SimpleIntrinsics) -> QuaternionCamera {
    let look_down = Quat::from_axis_angle(&Vec3::x_axis(), std::f64::consts::PI);
    let rotation = Quat::from_axis_angle(&Vec3::x_axis(), tilt) * look_down;
    let t = -(rotation * position);
    QuaternionCamera::new(intrinsics, QuaternionExtrinsics::from_rotation(&rotation, t))
}

/// Fill `store` with the scene as seen by `camera`.
///
/// Corners are added as [`CornerSource::Manual`]. Each segment gets
/// `samples_per_segment` detected observations at evenly spaced interior
/// parameters, with `alpha` left unset. Corner noise uses stream 0 and
/// segment `s` uses stream `s + 1`.
pub fn populate_store(
    store: &mut CorrespondenceStore,
    scene: &FieldScene,
    camera: &impl FieldProjection,
    samples_per_segment: usize,
    noise: &GaussianPixelNoise,
) {
    for (i, corner) in scene.corners.iter().enumerate() {
        let px = noise.apply(0, i, &camera.field_to_image(corner));
        store.add_corner_from(px, *corner, CornerSource::Manual);
    }
    for (s, shape) in scene.segments.iter().enumerate() {
        let id = store.add_segment(*shape);
        for k in 0..samples_per_segment {
            let alpha = (k + 1) as Real / (samples_per_segment + 1) as Real;
            let px = noise.apply(s + 1, k, &camera.field_to_image(&shape.point_at(alpha)));
            // Ids come from add_segment just above.
            let _ = store.add_segment_observation(id, px, true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_has_closed_boundary() {
        let scene = field_scene(9000.0, 6000.0, 500.0);
        assert_eq!(scene.segments.len(), 7);
        for i in 0..4 {
            let SegmentShape::Straight { p2, .. } = scene.segments[i] else {
                panic!("boundary must be straight");
            };
            let SegmentShape::Straight { p1, .. } = scene.segments[(i + 1) % 4] else {
                panic!("boundary must be straight");
            };
            assert_eq!(p2, p1);
        }
    }

    #[test]
    fn overhead_camera_sits_at_position() {
        let pos = Vec3::new(100.0, -200.0, 4000.0);
        let cam = overhead_camera(pos, 0.2, SimpleIntrinsics::default());
        assert!((cam.world_location().coords - pos).norm() < 1e-9);
        let centre_px = cam.field_to_image(&Pt3::new(100.0, -200.0, 0.0));
        assert!(centre_px.x.is_finite() && centre_px.y.is_finite());
    }

    #[test]
    fn populate_counts() {
        let scene = field_scene(9000.0, 6000.0, 500.0);
        let cam = overhead_camera(Vec3::new(0.0, 0.0, 4000.0), 0.0, SimpleIntrinsics::default());
        let mut store = CorrespondenceStore::new();
        populate_store(&mut store, &scene, &cam, 5, &GaussianPixelNoise::default());
        assert_eq!(store.corners().len(), 4);
        assert_eq!(store.detected_point_count(), 35);
    }
}
