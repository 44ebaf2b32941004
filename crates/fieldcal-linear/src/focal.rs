use fieldcal_core::{Mat3, Pt2, Real};

/// Single-view focal length from a field-plane homography.
///
/// Assumes square pixels, zero skew and a known principal point. Shifting
/// the image so the principal point is at the origin leaves the image of the
/// absolute conic as `diag(1, 1, f^2)` up to scale, and the two orthogonality
/// constraints on the homography columns
///
/// ```text
/// h1ᵀ ω h2 = 0
/// h1ᵀ ω h1 = h2ᵀ ω h2
/// ```
///
/// are linear in `f^2`; they are solved in the least-squares sense.
///
/// Returns `None` for a fronto-parallel view (the constraints vanish) or a
/// non-positive solution.
pub fn focal_from_homography(hmtx: &Mat3, principal_point: &Pt2) -> Option<Real> {
    let shift = Mat3::new(
        1.0,
        0.0,
        -principal_point.x,
        0.0,
        1.0,
        -principal_point.y,
        0.0,
        0.0,
        1.0,
    );
    let h = shift * hmtx;
    let (h1, h2) = (h.column(0), h.column(1));

    let a = [h1[2] * h2[2], h1[2] * h1[2] - h2[2] * h2[2]];
    let b = [
        h1[0] * h2[0] + h1[1] * h2[1],
        h1[0] * h1[0] + h1[1] * h1[1] - h2[0] * h2[0] - h2[1] * h2[1],
    ];

    let aa = a[0] * a[0] + a[1] * a[1];
    let scale = b[0] * b[0] + b[1] * b[1];
    if aa <= 1e-12 * scale.max(Real::MIN_POSITIVE) {
        return None;
    }
    let f2 = -(a[0] * b[0] + a[1] * b[1]) / aa;
    (f2 > 0.0).then(|| f2.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Rotation3, Vector3};

    fn homography(f: Real, pp: &Pt2, rot: &Rotation3<Real>, t: &Vector3<Real>) -> Mat3 {
        let k = Mat3::new(f, 0.0, pp.x, 0.0, f, pp.y, 0.0, 0.0, 1.0);
        let mut h = Mat3::zeros();
        h.set_column(0, &(k * rot.matrix().column(0)));
        h.set_column(1, &(k * rot.matrix().column(1)));
        h.set_column(2, &(k * t));
        h
    }

    #[test]
    fn recovers_focal_length_of_tilted_view() {
        let pp = Pt2::new(390.0, 290.0);
        let rot = Rotation3::from_euler_angles(std::f64::consts::PI - 0.4, 0.15, 0.3);
        let h = homography(620.0, &pp, &rot, &Vector3::new(50.0, 300.0, 5000.0));
        let f = focal_from_homography(&(h * 1e-3), &pp).unwrap();
        assert!((f - 620.0).abs() < 1e-6, "f={f}");
    }

    #[test]
    fn fronto_parallel_view_is_underdetermined() {
        let pp = Pt2::new(390.0, 290.0);
        let rot = Rotation3::from_euler_angles(std::f64::consts::PI, 0.0, 0.0);
        let h = homography(620.0, &pp, &rot, &Vector3::new(0.0, 0.0, 4000.0));
        assert!(focal_from_homography(&h, &pp).is_none());
    }
}
