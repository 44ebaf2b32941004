//! Numerical conditioning helpers shared by the linear solvers.

use fieldcal_core::{Mat3, Pt2};
use nalgebra::DMatrix;

/// Hartley normalisation for 2D points.
///
/// Centres the points at the origin and scales them so the mean distance
/// from the origin is `√2`. Returns the normalised points and the 3×3
/// transform `T` with `p_norm = T * p_homogeneous`, or `None` for an empty
/// slice or coincident points.
pub fn normalize_points_2d(points: &[Pt2]) -> Option<(Vec<Pt2>, Mat3)> {
    if points.is_empty() {
        return None;
    }

    let n = points.len() as f64;
    let centroid = points.iter().fold(Pt2::origin(), |acc, p| acc + p.coords / n);
    let mean_dist = points.iter().map(|p| (p - centroid).norm()).sum::<f64>() / n;
    if mean_dist <= f64::EPSILON {
        return None;
    }

    let scale = 2.0_f64.sqrt() / mean_dist;
    let t = Mat3::new(
        scale,
        0.0,
        -scale * centroid.x,
        0.0,
        scale,
        -scale * centroid.y,
        0.0,
        0.0,
        1.0,
    );
    let norm = points
        .iter()
        .map(|p| Pt2::from((p - centroid) * scale))
        .collect();

    Some((norm, t))
}

/// Reshape a 9-element row of `V^T` into a 3×3 matrix, row by row.
///
/// Returns `None` when `v_t` does not have 9 columns.
pub fn mat3_from_svd_row(v_t: &DMatrix<f64>, row_idx: usize) -> Option<Mat3> {
    if v_t.ncols() != 9 || row_idx >= v_t.nrows() {
        return None;
    }
    Some(Mat3::from_fn(|r, c| v_t[(row_idx, 3 * r + c)]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_2d_centering() {
        let points = vec![
            Pt2::new(100.0, 200.0),
            Pt2::new(200.0, 300.0),
            Pt2::new(150.0, 250.0),
        ];
        let (norm, t) = normalize_points_2d(&points).unwrap();

        let cx: f64 = norm.iter().map(|p| p.x).sum::<f64>() / norm.len() as f64;
        let cy: f64 = norm.iter().map(|p| p.y).sum::<f64>() / norm.len() as f64;
        assert!(cx.abs() < 1e-10, "centroid x not at origin: {cx}");
        assert!(cy.abs() < 1e-10, "centroid y not at origin: {cy}");

        let mean_dist: f64 =
            norm.iter().map(|p| p.coords.norm()).sum::<f64>() / norm.len() as f64;
        assert!((mean_dist - 2.0_f64.sqrt()).abs() < 1e-10);

        let mapped = t * fieldcal_core::to_homogeneous(&points[1]);
        assert!((fieldcal_core::from_homogeneous(&mapped) - norm[1]).norm() < 1e-12);
    }

    #[test]
    fn coincident_points_are_rejected() {
        let points = vec![Pt2::new(1.0, 1.0); 4];
        assert!(normalize_points_2d(&points).is_none());
    }

    #[test]
    fn svd_row_extraction() {
        let mut v_t = DMatrix::zeros(9, 9);
        for i in 0..9 {
            v_t[(8, i)] = (i + 1) as f64;
        }
        let m = mat3_from_svd_row(&v_t, 8).unwrap();
        assert_eq!(m[(0, 1)], 2.0);
        assert_eq!(m[(1, 0)], 4.0);
        assert_eq!(m[(2, 2)], 9.0);
        assert!(mat3_from_svd_row(&DMatrix::zeros(4, 4), 0).is_none());
    }
}
