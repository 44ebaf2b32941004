//! Small geometric primitives shared by the projection engine and the
//! correspondence store.

use crate::{Pt2, Pt3, Quat, Real, Vec2, Vec3};

/// Intersect the ray `ray_origin + t * ray_dir` with the plane through
/// `plane_origin` with normal `plane_normal`.
///
/// Returns the ray parameter `t`, or `None` when the ray runs parallel to
/// the plane.
pub fn ray_plane_intersect(
    plane_origin: &Pt3,
    plane_normal: &Vec3,
    ray_origin: &Pt3,
    ray_dir: &Vec3,
) -> Option<Real> {
    let denom = plane_normal.dot(ray_dir);
    if denom.abs() < Real::EPSILON {
        return None;
    }
    Some(-plane_normal.dot(&(ray_origin - plane_origin)) / denom)
}

/// Closest point to `p` on the segment `[a, b]`.
///
/// Also returns the clamped segment parameter `s` so that the point equals
/// `a + s * (b - a)`. A degenerate segment yields `a` with `s = 0`.
pub fn closest_point_on_segment(p: &Pt3, a: &Pt3, b: &Pt3) -> (Pt3, Real) {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 < Real::EPSILON {
        return (*a, 0.0);
    }
    let s = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    (a + ab * s, s)
}

/// Intersection of two infinite 2D lines given in point/direction form.
///
/// Returns `None` for (nearly) parallel lines.
pub fn line_intersection_2d(p: &Pt2, d: &Vec2, q: &Pt2, e: &Vec2) -> Option<Pt2> {
    let cross = d.x * e.y - d.y * e.x;
    let scale = d.norm() * e.norm();
    if scale < Real::EPSILON || cross.abs() < 1e-12 * scale {
        return None;
    }
    let w = q - p;
    let t = (w.x * e.y - w.y * e.x) / cross;
    Some(p + d * t)
}

/// Unit quaternion rotating by `|v|` radians about the axis `v`.
///
/// The zero vector maps to the identity rotation.
pub fn axis_angle_quaternion(v: &Vec3) -> Quat {
    Quat::from_scaled_axis(*v)
}
