use fieldcal_core::{from_homogeneous, to_homogeneous, Mat3, Pt2, Real};
use nalgebra::DMatrix;
use thiserror::Error;

use crate::math::{mat3_from_svd_row, normalize_points_2d};

#[derive(Debug, Error, PartialEq)]
pub enum HomographyError {
    #[error("need at least 4 point correspondences, got {0}")]
    NotEnoughPoints(usize),
    #[error("mismatched correspondence counts: {world} field points, {image} image points")]
    CountMismatch { world: usize, image: usize },
    #[error("degenerate point configuration")]
    Degenerate,
    #[error("svd failed")]
    SvdFailed,
    #[error("camera matrix is not invertible")]
    SingularIntrinsics,
    #[error("need at least 3 views of the target, got {0}")]
    NotEnoughViews(usize),
}

/// Estimate `H` such that `image ~ H * field` with the normalised DLT.
///
/// Both point sets are Hartley-normalised before building the design matrix
/// and the result is denormalised and scaled so that `H[2, 2] = 1` when that
/// entry is non-zero.
pub fn dlt_homography(world: &[Pt2], image: &[Pt2]) -> Result<Mat3, HomographyError> {
    let n = world.len();
    if image.len() != n {
        return Err(HomographyError::CountMismatch {
            world: n,
            image: image.len(),
        });
    }
    if n < 4 {
        return Err(HomographyError::NotEnoughPoints(n));
    }

    let (world_n, t_world) = normalize_points_2d(world).ok_or(HomographyError::Degenerate)?;
    let (image_n, t_image) = normalize_points_2d(image).ok_or(HomographyError::Degenerate)?;

    // Pad to at least 9 rows so the SVD exposes the full V^T.
    let rows = (2 * n).max(9);
    let mut a = DMatrix::<Real>::zeros(rows, 9);
    for (i, (pw, pi)) in world_n.iter().zip(image_n.iter()).enumerate() {
        let (x, y, u, v) = (pw.x, pw.y, pi.x, pi.y);
        let r0 = 2 * i;
        let r1 = r0 + 1;

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t.ok_or(HomographyError::SvdFailed)?;
    let h_norm = mat3_from_svd_row(&v_t, v_t.nrows() - 1).ok_or(HomographyError::SvdFailed)?;

    let t_image_inv = t_image
        .try_inverse()
        .ok_or(HomographyError::Degenerate)?;
    let mut h = t_image_inv * h_norm * t_world;

    let scale = h[(2, 2)];
    if scale.abs() > Real::EPSILON {
        h /= scale;
    }
    Ok(h)
}

/// Apply a plane homography to a point.
pub fn apply_homography(h: &Mat3, p: &Pt2) -> Pt2 {
    from_homogeneous(&(h * to_homogeneous(p)))
}

/// RMS transfer error of `h` over the correspondences, in image units.
pub fn homography_rms_error(h: &Mat3, world: &[Pt2], image: &[Pt2]) -> Option<Real> {
    if world.is_empty() || world.len() != image.len() {
        return None;
    }
    let sum: Real = world
        .iter()
        .zip(image)
        .map(|(w, i)| (apply_homography(h, w) - i).norm_squared())
        .sum();
    Some((sum / world.len() as Real).sqrt())
}
