//! Corner harvesting from detected field lines.
//!
//! An external line detector reports, for each visible field line, two
//! pixels on it. Pairs of such lines are intersected twice: in undistorted
//! pixel space, where straight field lines stay straight, and in field
//! space. Every intersection that survives the plausibility checks becomes a
//! corner correspondence.

use fieldcal_core::{line_intersection_2d, FieldProjection, Pt2, Pt3, Real};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{CalibrationConfig, FieldLine};

/// A field line found in the image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFieldLine {
    pub name: String,
    pub field_p1: Pt2,
    pub field_p2: Pt2,
    /// Two distinct (distorted) pixels on the line.
    pub image_p1: Pt2,
    pub image_p2: Pt2,
}

impl DetectedFieldLine {
    pub fn new(line: &FieldLine, image_p1: Pt2, image_p2: Pt2) -> Self {
        Self {
            name: line.name.clone(),
            field_p1: line.p1,
            field_p2: line.p2,
            image_p1,
            image_p2,
        }
    }
}

/// Corner candidate that passed every check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarvestedCorner {
    pub image: Pt2,
    pub field: Pt3,
}

fn on_plane(p: &Pt2) -> Pt3 {
    Pt3::new(p.x, p.y, 0.0)
}

/// Whether `p` lies in the bounding box of the field line grown by `margin`
/// on every side.
fn near_line(p: &Pt3, line: &DetectedFieldLine, margin: Real) -> bool {
    let (a, b) = (&line.field_p1, &line.field_p2);
    p.x >= a.x.min(b.x) - margin
        && p.x <= a.x.max(b.x) + margin
        && p.y >= a.y.min(b.y) - margin
        && p.y <= a.y.max(b.y) + margin
}

fn inside_image(p: &Pt2, config: &CalibrationConfig) -> bool {
    if !(p.x.is_finite() && p.y.is_finite()) {
        return false;
    }
    if config.image_width == 0 || config.image_height == 0 {
        return true;
    }
    let b = config.image_boundary;
    p.x >= b
        && p.y >= b
        && p.x <= config.image_width as Real - b
        && p.y <= config.image_height as Real - b
}

/// Intersect every pair of detected lines and keep the plausible corners.
///
/// A candidate is dropped when the lines are parallel in either space, when
/// the field intersection falls outside the bounding box of either physical
/// line grown by the configured margin, when it is beyond the maximum feature distance from
/// the camera, or when its re-distorted pixel falls outside the image minus
/// the border.
pub fn harvest_corners(
    lines: &[DetectedFieldLine],
    camera: &impl FieldProjection,
    config: &CalibrationConfig,
) -> Vec<HarvestedCorner> {
    let undistorted: Vec<(Pt2, Pt2)> = lines
        .iter()
        .map(|l| (camera.undistort_pixel(&l.image_p1), camera.undistort_pixel(&l.image_p2)))
        .collect();
    let camera_location = camera.world_location();
    let margin = config.corner_intersection_margin;

    let mut out = Vec::new();
    for i in 0..lines.len() {
        for j in (i + 1)..lines.len() {
            let (a, b) = (&lines[i], &lines[j]);
            let Some(field) = line_intersection_2d(
                &a.field_p1,
                &(a.field_p2 - a.field_p1),
                &b.field_p1,
                &(b.field_p2 - b.field_p1),
            ) else {
                debug!("{} and {} are parallel on the field", a.name, b.name);
                continue;
            };
            let field = on_plane(&field);
            if !near_line(&field, a, margin) || !near_line(&field, b, margin) {
                debug!("{} and {} do not meet on the field", a.name, b.name);
                continue;
            }

            let (ua, ub) = (&undistorted[i], &undistorted[j]);
            let Some(ideal) = line_intersection_2d(&ua.0, &(ua.1 - ua.0), &ub.0, &(ub.1 - ub.0))
            else {
                warn!("{} and {} are parallel in the image, corner skipped", a.name, b.name);
                continue;
            };
            let distance = (field - camera_location).norm();
            if distance > config.max_feature_distance {
                warn!(
                    "corner {}/{} is {distance:.0} mm from the camera, skipped",
                    a.name, b.name
                );
                continue;
            }
            let image = camera.distort_pixel(&ideal);
            if !inside_image(&image, config) {
                warn!(
                    "corner {}/{} at ({:.1}, {:.1}) is outside the image, skipped",
                    a.name, b.name, image.x, image.y
                );
                continue;
            }
            out.push(HarvestedCorner { image, field });
        }
    }
    out
}
