//! Coordinate conversions between pixels and the normalised image plane.
//!
//! The camera matrix and its inverse are passed in precomputed: intrinsics
//! cache both, so no inversion happens on the projection hot path.

use crate::{DistortionModel, Mat3, Pt2, Vec2, Vec3};

/// Convert pixel coordinates to normalised coordinates (`Z = 1` plane) by
/// applying `K^{-1}`.
pub fn pixel_to_normalized(pixel: &Pt2, camera_mat_inv: &Mat3) -> Vec2 {
    let v = camera_mat_inv * Vec3::new(pixel.x, pixel.y, 1.0);
    Vec2::new(v.x / v.z, v.y / v.z)
}

/// Convert normalised coordinates to pixel coordinates by applying `K`.
pub fn normalized_to_pixel(normalized: &Vec2, camera_mat: &Mat3) -> Pt2 {
    let v = camera_mat * Vec3::new(normalized.x, normalized.y, 1.0);
    Pt2::new(v.x / v.z, v.y / v.z)
}

/// Map a distorted pixel to the pixel an ideal (distortion-free) camera with
/// the same camera matrix would observe.
pub fn undistort_pixel<D: DistortionModel>(
    pixel: &Pt2,
    camera_mat: &Mat3,
    camera_mat_inv: &Mat3,
    distortion: &D,
) -> Pt2 {
    let n_d = pixel_to_normalized(pixel, camera_mat_inv);
    normalized_to_pixel(&distortion.undistort(&n_d), camera_mat)
}

/// Inverse of [`undistort_pixel`]: re-apply lens distortion to an ideal pixel.
///
/// The round trip is exact only up to the accuracy of the model's inverse.
pub fn distort_pixel<D: DistortionModel>(
    pixel: &Pt2,
    camera_mat: &Mat3,
    camera_mat_inv: &Mat3,
    distortion: &D,
) -> Pt2 {
    let n_u = pixel_to_normalized(pixel, camera_mat_inv);
    normalized_to_pixel(&distortion.distort(&n_u), camera_mat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BrownConrady5;

    fn k() -> Mat3 {
        Mat3::new(800.0, 0.0, 640.0, 0.0, 780.0, 360.0, 0.0, 0.0, 1.0)
    }

    #[test]
    fn pixel_normalized_roundtrip() {
        let k = k();
        let k_inv = k.try_inverse().unwrap();
        let pixel = Pt2::new(700.0, 400.0);

        let n = pixel_to_normalized(&pixel, &k_inv);
        let back = normalized_to_pixel(&n, &k);

        assert!((back - pixel).norm() < 1e-10);
    }

    #[test]
    fn principal_point_maps_to_origin() {
        let k_inv = k().try_inverse().unwrap();
        let n = pixel_to_normalized(&Pt2::new(640.0, 360.0), &k_inv);
        assert!(n.norm() < 1e-12);
    }

    #[test]
    fn distort_undistort_pixel_roundtrip() {
        let k = k();
        let k_inv = k.try_inverse().unwrap();
        let dist = BrownConrady5 {
            k1: -0.2,
            k2: 0.05,
            p1: 0.001,
            p2: -0.0005,
            k3: 0.0,
            iters: 20,
        };
        let ideal = Pt2::new(520.0, 300.0);
        let distorted = distort_pixel(&ideal, &k, &k_inv, &dist);
        let back = undistort_pixel(&distorted, &k, &k_inv, &dist);
        assert!((back - ideal).norm() < 1e-6, "err={}", (back - ideal).norm());
    }
}
