//! Corner and line-segment correspondences feeding the calibration solver.
//!
//! Corners pair a pixel with a known field point. Segment observations pair a
//! pixel with an unknown position `alpha` along a known field line or arc;
//! `alpha` is estimated jointly with the camera.
//!
//! Observations flagged `detected = false` keep their slot so indices stay
//! stable between detection passes, but they never contribute residuals and
//! never receive an `alpha` slot in the solver.

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{closest_point_on_segment, FieldProjection, Pt2, Pt3, Real, Vec3};

#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("unknown segment id {0}")]
    UnknownSegment(usize),
    #[error("segment {segment} has no observation {index}")]
    UnknownObservation { segment: usize, index: usize },
    #[error("unknown corner index {0}")]
    UnknownCorner(usize),
    #[error("expected {expected} alpha values for detected points, got {got}")]
    AlphaCountMismatch { expected: usize, got: usize },
}

/// Where a corner correspondence came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CornerSource {
    /// Added directly by the operator.
    Manual,
    /// Mirrored from the configured control points.
    ControlPoint,
    /// Harvested from intersections of detected field lines.
    Detected,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CornerCorrespondence {
    pub image: Pt2,
    pub field: Pt3,
    pub detected: bool,
    pub source: CornerSource,
}

/// Known field marking an observation slides along.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SegmentShape {
    Straight {
        p1: Pt3,
        p2: Pt3,
    },
    /// Arc in the horizontal plane through `center`, angles in radians.
    Arc {
        center: Pt3,
        radius: Real,
        theta1: Real,
        theta2: Real,
    },
}

impl SegmentShape {
    /// Field point at parameter `alpha`: `alpha = 1` is the first endpoint
    /// (`p1` / `theta1`), `alpha = 0` the second.
    pub fn point_at(&self, alpha: Real) -> Pt3 {
        match *self {
            Self::Straight { p1, p2 } => Pt3::from(p1.coords * alpha + p2.coords * (1.0 - alpha)),
            Self::Arc {
                center,
                radius,
                theta1,
                theta2,
            } => {
                let theta = alpha * theta1 + (1.0 - alpha) * theta2;
                center + Vec3::new(theta.cos(), theta.sin(), 0.0) * radius
            }
        }
    }

    pub fn is_straight(&self) -> bool {
        matches!(self, Self::Straight { .. })
    }

    /// Height of the plane the marking lies in.
    pub fn height(&self) -> Real {
        match self {
            Self::Straight { p1, p2 } => 0.5 * (p1.z + p2.z),
            Self::Arc { center, .. } => center.z,
        }
    }

    /// Parameter of the point on the marking closest to `p`, clamped to
    /// `[0, 1]`.
    pub fn closest_alpha(&self, p: &Pt3) -> Real {
        match *self {
            Self::Straight { p1, p2 } => closest_point_on_segment(p, &p2, &p1).1,
            Self::Arc {
                center,
                theta1,
                theta2,
                ..
            } => {
                let span = theta1 - theta2;
                if span.abs() <= Real::EPSILON {
                    return 0.5;
                }
                let mid = 0.5 * (theta1 + theta2);
                let phi = (p.y - center.y).atan2(p.x - center.x);
                let tau = 2.0 * std::f64::consts::PI;
                // Unwrap to the branch nearest the arc centre angle.
                let phi = phi + tau * ((mid - phi) / tau).round();
                ((phi - theta2) / span).clamp(0.0, 1.0)
            }
        }
    }
}

/// One observed pixel on a [`CalibrationSegment`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationDataPoint {
    pub image: Pt2,
    pub detected: bool,
    /// Position along the segment; `None` until seeded or estimated.
    #[serde(default)]
    pub alpha: Option<Real>,
    /// Back-projection of `image` onto the field (diagnostic).
    #[serde(skip)]
    pub world: Option<Pt3>,
    /// Closest point on the segment to `world` (diagnostic).
    #[serde(skip)]
    pub world_closest: Option<Pt3>,
    /// Projection of `world_closest` into the image (diagnostic).
    #[serde(skip)]
    pub image_closest: Option<Pt2>,
}

impl CalibrationDataPoint {
    pub fn new(image: Pt2, detected: bool) -> Self {
        Self {
            image,
            detected,
            alpha: None,
            world: None,
            world_closest: None,
            image_closest: None,
        }
    }

    fn clear_diagnostics(&mut self) {
        self.world = None;
        self.world_closest = None;
        self.image_closest = None;
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSegment {
    pub shape: SegmentShape,
    #[serde(default)]
    pub points: Vec<CalibrationDataPoint>,
}

impl CalibrationSegment {
    pub fn new(shape: SegmentShape) -> Self {
        Self {
            shape,
            points: Vec::new(),
        }
    }
}

/// Handle returned by [`CorrespondenceStore::add_segment`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentId(pub usize);

/// Flattened view of one detected segment observation, in solver order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentObservation {
    pub shape: SegmentShape,
    pub image: Pt2,
    pub alpha: Real,
}

/// Fallback parameter for detected points that were never seeded.
const UNSEEDED_ALPHA: Real = 0.5;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrespondenceStore {
    #[serde(default)]
    corners: Vec<CornerCorrespondence>,
    #[serde(default)]
    segments: Vec<CalibrationSegment>,
}

impl CorrespondenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn corners(&self) -> &[CornerCorrespondence] {
        &self.corners
    }

    pub fn detected_corners(&self) -> impl Iterator<Item = &CornerCorrespondence> {
        self.corners.iter().filter(|c| c.detected)
    }

    pub fn detected_corner_count(&self) -> usize {
        self.detected_corners().count()
    }

    /// Append a manual corner correspondence.
    pub fn add_corner(&mut self, image: Pt2, field: Pt3) -> usize {
        self.add_corner_from(image, field, CornerSource::Manual)
    }

    pub fn add_corner_from(&mut self, image: Pt2, field: Pt3, source: CornerSource) -> usize {
        self.corners.push(CornerCorrespondence {
            image,
            field,
            detected: true,
            source,
        });
        self.corners.len() - 1
    }

    /// Remove every corner that came from `source`.
    pub fn clear_corners(&mut self, source: CornerSource) {
        self.corners.retain(|c| c.source != source);
    }

    pub fn set_corner_detected(&mut self, index: usize, detected: bool) -> Result<(), StoreError> {
        let corner = self
            .corners
            .get_mut(index)
            .ok_or(StoreError::UnknownCorner(index))?;
        corner.detected = detected;
        Ok(())
    }

    pub fn segments(&self) -> &[CalibrationSegment] {
        &self.segments
    }

    pub fn segment(&self, id: SegmentId) -> Result<&CalibrationSegment, StoreError> {
        self.segments.get(id.0).ok_or(StoreError::UnknownSegment(id.0))
    }

    fn segment_mut(&mut self, id: SegmentId) -> Result<&mut CalibrationSegment, StoreError> {
        self.segments
            .get_mut(id.0)
            .ok_or(StoreError::UnknownSegment(id.0))
    }

    pub fn add_segment(&mut self, shape: SegmentShape) -> SegmentId {
        self.segments.push(CalibrationSegment::new(shape));
        SegmentId(self.segments.len() - 1)
    }

    /// Append an observation to a segment and return its index within it.
    pub fn add_segment_observation(
        &mut self,
        segment: SegmentId,
        image: Pt2,
        detected: bool,
    ) -> Result<usize, StoreError> {
        let seg = self.segment_mut(segment)?;
        seg.points.push(CalibrationDataPoint::new(image, detected));
        Ok(seg.points.len() - 1)
    }

    /// Like [`Self::add_segment_observation`] with a known initial `alpha`.
    pub fn add_segment_observation_with_alpha(
        &mut self,
        segment: SegmentId,
        image: Pt2,
        detected: bool,
        alpha: Real,
    ) -> Result<usize, StoreError> {
        let seg = self.segment_mut(segment)?;
        let mut point = CalibrationDataPoint::new(image, detected);
        point.alpha = Some(alpha);
        seg.points.push(point);
        Ok(seg.points.len() - 1)
    }

    /// Overwrite an existing observation in place. The stored `alpha` is
    /// kept so a re-detected point resumes from its last estimate.
    pub fn update_segment_observation(
        &mut self,
        segment: SegmentId,
        index: usize,
        image: Pt2,
        detected: bool,
    ) -> Result<(), StoreError> {
        let seg = self.segment_mut(segment)?;
        let point = seg
            .points
            .get_mut(index)
            .ok_or(StoreError::UnknownObservation {
                segment: segment.0,
                index,
            })?;
        point.image = image;
        point.detected = detected;
        point.clear_diagnostics();
        Ok(())
    }

    pub fn set_observation_detected(
        &mut self,
        segment: SegmentId,
        index: usize,
        detected: bool,
    ) -> Result<(), StoreError> {
        let seg = self.segment_mut(segment)?;
        let point = seg
            .points
            .get_mut(index)
            .ok_or(StoreError::UnknownObservation {
                segment: segment.0,
                index,
            })?;
        point.detected = detected;
        Ok(())
    }

    fn detected_points(&self) -> impl Iterator<Item = (&SegmentShape, &CalibrationDataPoint)> {
        self.segments
            .iter()
            .flat_map(|s| s.points.iter().map(move |p| (&s.shape, p)))
            .filter(|(_, p)| p.detected)
    }

    /// Number of detected segment observations, i.e. the number of `alpha`
    /// slots a full calibration pass allocates.
    pub fn detected_point_count(&self) -> usize {
        self.detected_points().count()
    }

    /// Current `alpha` of every detected observation in solver order.
    pub fn detected_alphas(&self) -> Vec<Real> {
        self.detected_points()
            .map(|(_, p)| p.alpha.unwrap_or(UNSEEDED_ALPHA))
            .collect()
    }

    /// Detected observations flattened in solver order.
    pub fn detected_observations(&self) -> Vec<SegmentObservation> {
        self.detected_points()
            .map(|(shape, p)| SegmentObservation {
                shape: *shape,
                image: p.image,
                alpha: p.alpha.unwrap_or(UNSEEDED_ALPHA),
            })
            .collect()
    }

    /// Store estimated `alpha` values back, in the order of
    /// [`Self::detected_alphas`].
    pub fn write_back_alphas(&mut self, alphas: &[Real]) -> Result<(), StoreError> {
        let expected = self.detected_point_count();
        if alphas.len() != expected {
            return Err(StoreError::AlphaCountMismatch {
                expected,
                got: alphas.len(),
            });
        }
        let points = self
            .segments
            .iter_mut()
            .flat_map(|s| s.points.iter_mut())
            .filter(|p| p.detected);
        for (point, alpha) in points.zip(alphas) {
            point.alpha = Some(*alpha);
        }
        Ok(())
    }

    /// Give every detected observation without an `alpha` an initial value
    /// from back-projection through `camera`. Returns how many were seeded.
    pub fn seed_alphas(&mut self, camera: &impl FieldProjection) -> usize {
        let mut seeded = 0;
        for seg in &mut self.segments {
            let shape = seg.shape;
            for point in seg.points.iter_mut().filter(|p| p.detected && p.alpha.is_none()) {
                let alpha = camera
                    .image_to_field(&point.image, shape.height())
                    .map(|w| shape.closest_alpha(&w))
                    .unwrap_or(UNSEEDED_ALPHA);
                point.alpha = Some(alpha);
                seeded += 1;
            }
        }
        if seeded > 0 {
            debug!("seeded {seeded} segment parameters from back-projection");
        }
        seeded
    }

    /// Refresh the per-point diagnostics for straight segments: back-project
    /// each detected pixel, snap it to the segment and re-project the snapped
    /// point. Arc segments and undetected points have their diagnostics
    /// cleared.
    pub fn update_calibration_data_points(&mut self, camera: &impl FieldProjection) {
        for seg in &mut self.segments {
            let shape = seg.shape;
            for point in &mut seg.points {
                point.clear_diagnostics();
                let SegmentShape::Straight { p1, p2 } = shape else {
                    continue;
                };
                if !point.detected {
                    continue;
                }
                let Some(world) = camera.image_to_field(&point.image, shape.height()) else {
                    continue;
                };
                let (closest, _) = closest_point_on_segment(&world, &p1, &p2);
                point.world = Some(world);
                point.world_closest = Some(closest);
                point.image_closest = Some(camera.field_to_image(&closest));
            }
        }
    }

    /// RMS pixel distance between observed pixels and their snapped
    /// re-projections, over points with fresh diagnostics.
    pub fn calibration_data_points_rmse(&self) -> Option<Real> {
        let (sum, n) = self
            .segments
            .iter()
            .flat_map(|s| s.points.iter())
            .filter_map(|p| p.image_closest.map(|c| (c - p.image).norm_squared()))
            .fold((0.0, 0usize), |(s, n), e| (s + e, n + 1));
        (n > 0).then(|| (sum / n as Real).sqrt())
    }

    /// Drop all segment observations, keeping the segment definitions.
    pub fn clear_observations(&mut self) {
        for seg in &mut self.segments {
            seg.points.clear();
        }
    }

    pub fn clear_segments(&mut self) {
        self.segments.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{QuaternionCamera, QuaternionExtrinsics, Quat, SimpleIntrinsics};

    fn straight() -> SegmentShape {
        SegmentShape::Straight {
            p1: Pt3::new(1000.0, 0.0, 0.0),
            p2: Pt3::new(-1000.0, 0.0, 0.0),
        }
    }

    fn camera() -> QuaternionCamera {
        let rotation = Quat::from_axis_angle(&Vec3::x_axis(), std::f64::consts::PI);
        let t = -(rotation * Vec3::new(0.0, 0.0, 4000.0));
        QuaternionCamera::new(
            SimpleIntrinsics::new(600.0, 390.0, 290.0, 0.0),
            QuaternionExtrinsics::from_rotation(&rotation, t),
        )
    }

    #[test]
    fn straight_alpha_endpoints() {
        let s = straight();
        assert_eq!(s.point_at(1.0), Pt3::new(1000.0, 0.0, 0.0));
        assert_eq!(s.point_at(0.0), Pt3::new(-1000.0, 0.0, 0.0));
        assert!((s.closest_alpha(&Pt3::new(500.0, 30.0, 0.0)) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn arc_alpha_roundtrip_across_wrap() {
        let arc = SegmentShape::Arc {
            center: Pt3::new(0.0, 0.0, 0.0),
            radius: 500.0,
            theta1: 3.5,
            theta2: 2.5,
        };
        for alpha in [0.0, 0.3, 0.9] {
            let p = arc.point_at(alpha);
            assert!((p.coords.norm() - 500.0).abs() < 1e-9);
            assert!((arc.closest_alpha(&p) - alpha).abs() < 1e-9, "alpha={alpha}");
        }
    }

    #[test]
    fn undetected_points_keep_slots_but_not_alphas() {
        let mut store = CorrespondenceStore::new();
        let id = store.add_segment(straight());
        store.add_segment_observation_with_alpha(id, Pt2::new(1.0, 1.0), true, 0.2).unwrap();
        store.add_segment_observation_with_alpha(id, Pt2::new(2.0, 2.0), false, 0.4).unwrap();
        store.add_segment_observation_with_alpha(id, Pt2::new(3.0, 3.0), true, 0.6).unwrap();

        assert_eq!(store.segment(id).unwrap().points.len(), 3);
        assert_eq!(store.detected_point_count(), 2);
        assert_eq!(store.detected_alphas(), vec![0.2, 0.6]);

        store.write_back_alphas(&[0.25, 0.65]).unwrap();
        let pts = &store.segment(id).unwrap().points;
        assert_eq!(pts[0].alpha, Some(0.25));
        assert_eq!(pts[1].alpha, Some(0.4));
        assert_eq!(pts[2].alpha, Some(0.65));

        assert_eq!(
            store.write_back_alphas(&[0.1]),
            Err(StoreError::AlphaCountMismatch {
                expected: 2,
                got: 1
            })
        );
    }

    #[test]
    fn unknown_ids_are_errors() {
        let mut store = CorrespondenceStore::new();
        assert_eq!(
            store.add_segment_observation(SegmentId(3), Pt2::origin(), true),
            Err(StoreError::UnknownSegment(3))
        );
        let id = store.add_segment(straight());
        assert!(matches!(
            store.update_segment_observation(id, 0, Pt2::origin(), true),
            Err(StoreError::UnknownObservation { .. })
        ));
        assert_eq!(store.set_corner_detected(0, false), Err(StoreError::UnknownCorner(0)));
    }

    #[test]
    fn seeding_uses_back_projection() {
        let cam = camera();
        let mut store = CorrespondenceStore::new();
        let id = store.add_segment(straight());
        let px = cam.field_to_image(&Pt3::new(-500.0, 0.0, 0.0));
        store.add_segment_observation(id, px, true).unwrap();
        store.add_segment_observation(id, px, false).unwrap();

        assert_eq!(store.seed_alphas(&cam), 1);
        let alpha = store.segment(id).unwrap().points[0].alpha.unwrap();
        assert!((alpha - 0.25).abs() < 1e-9, "alpha={alpha}");
        assert_eq!(store.segment(id).unwrap().points[1].alpha, None);
    }

    #[test]
    fn data_point_diagnostics_and_rmse() {
        let cam = camera();
        let mut store = CorrespondenceStore::new();
        let id = store.add_segment(straight());
        assert_eq!(store.calibration_data_points_rmse(), None);

        let on_line = cam.field_to_image(&Pt3::new(200.0, 0.0, 0.0));
        let off_line = cam.field_to_image(&Pt3::new(-300.0, 50.0, 0.0));
        store.add_segment_observation(id, on_line, true).unwrap();
        store.add_segment_observation(id, off_line, true).unwrap();
        store.update_calibration_data_points(&cam);

        let pts = &store.segment(id).unwrap().points;
        let closest = pts[1].world_closest.unwrap();
        assert!((closest - Pt3::new(-300.0, 0.0, 0.0)).norm() < 1e-6);
        let rmse = store.calibration_data_points_rmse().unwrap();
        let off = (pts[1].image_closest.unwrap() - off_line).norm();
        assert!((rmse - (off * off / 2.0).sqrt()).abs() < 1e-6);
    }

    #[test]
    fn clearing_corners_by_source() {
        let mut store = CorrespondenceStore::new();
        store.add_corner(Pt2::new(1.0, 2.0), Pt3::origin());
        store.add_corner_from(Pt2::new(3.0, 4.0), Pt3::origin(), CornerSource::Detected);
        store.clear_corners(CornerSource::Detected);
        assert_eq!(store.corners().len(), 1);
        assert_eq!(store.corners()[0].source, CornerSource::Manual);
    }
}
