use serde::{Deserialize, Serialize};

use crate::{Real, Vec2};

/// Lens distortion acting on normalised image-plane coordinates.
pub trait DistortionModel {
    /// Map ideal (undistorted) normalised coordinates to distorted ones.
    fn distort(&self, n_undist: &Vec2) -> Vec2;
    /// Map distorted normalised coordinates back to ideal ones.
    fn undistort(&self, n_dist: &Vec2) -> Vec2;
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct NoDistortion;

impl DistortionModel for NoDistortion {
    fn distort(&self, n_undist: &Vec2) -> Vec2 {
        *n_undist
    }

    fn undistort(&self, n_dist: &Vec2) -> Vec2 {
        *n_dist
    }
}

/// Apply single-coefficient radial distortion to the undistorted radius `ru`.
///
/// Solves `a * rd^3 + rd = ru` for `rd` with the closed-form root of the
/// depressed cubic:
///
/// ```text
/// b  = cbrt(-9 a^2 ru + a sqrt(a (12 + 81 a ru^2)))
/// rd = (2/3)^(1/3) / b - b / (18^(1/3) a)
/// ```
///
/// Coefficients at or below machine epsilon (including negative ones) leave
/// the radius untouched.
pub fn radial_distortion(ru: Real, a: Real) -> Real {
    if a <= Real::EPSILON {
        return ru;
    }
    let b = -9.0 * a * a * ru + a * (a * (12.0 + 81.0 * a * ru * ru)).sqrt();
    let b = b.cbrt();
    (2.0 / 3.0 as Real).cbrt() / b - b / ((2.0 * 3.0 * 3.0 as Real).cbrt() * a)
}

/// Undo [`radial_distortion`] on a distorted radius `rd`: `ru = rd (1 + rd^2 a)`.
///
/// This is the polynomial used by image-to-field back-projection. It is kept
/// as-is even though the forward map is evaluated through a numerically
/// sensitive closed form, so the two only agree up to rounding. Coefficients
/// at or below machine epsilon are the identity, matching the forward map.
pub fn radial_distortion_inv(rd: Real, a: Real) -> Real {
    if a <= Real::EPSILON {
        return rd;
    }
    rd * (1.0 + rd * rd * a)
}

/// Odd-order radial model with a single coefficient, applied along the ray
/// from the principal point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OddRadial {
    pub distortion: Real,
}

impl OddRadial {
    fn rescale(n: &Vec2, r_new: Real) -> Vec2 {
        let r = n.norm();
        if r == 0.0 {
            return Vec2::zeros();
        }
        n * (r_new / r)
    }
}

impl DistortionModel for OddRadial {
    fn distort(&self, n_undist: &Vec2) -> Vec2 {
        if self.distortion <= Real::EPSILON {
            return *n_undist;
        }
        Self::rescale(n_undist, radial_distortion(n_undist.norm(), self.distortion))
    }

    fn undistort(&self, n_dist: &Vec2) -> Vec2 {
        if self.distortion <= Real::EPSILON {
            return *n_dist;
        }
        Self::rescale(n_dist, radial_distortion_inv(n_dist.norm(), self.distortion))
    }
}

/// Brown–Conrady radial/tangential model with the coefficient order
/// `[k1, k2, p1, p2, k3]` used by common calibration libraries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BrownConrady5 {
    pub k1: Real,
    pub k2: Real,
    pub p1: Real,
    pub p2: Real,
    pub k3: Real,
    /// Fixed-point iterations used by [`DistortionModel::undistort`]
    /// (0 selects the default of 8).
    #[serde(default)]
    pub iters: u32,
}

impl BrownConrady5 {
    /// Coefficients in library order `[k1, k2, p1, p2, k3]`.
    pub fn coeffs(&self) -> [Real; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    pub fn from_coeffs(c: [Real; 5], iters: u32) -> Self {
        Self {
            k1: c[0],
            k2: c[1],
            p1: c[2],
            p2: c[3],
            k3: c[4],
            iters,
        }
    }

    fn distort_impl(&self, x: Real, y: Real) -> (Real, Real) {
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;

        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;

        let xy = x * y;
        let x_tan = 2.0 * self.p1 * xy + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * xy;

        (x * radial + x_tan, y * radial + y_tan)
    }
}

impl DistortionModel for BrownConrady5 {
    fn distort(&self, n_undist: &Vec2) -> Vec2 {
        let (xd, yd) = self.distort_impl(n_undist.x, n_undist.y);
        Vec2::new(xd, yd)
    }

    fn undistort(&self, n_dist: &Vec2) -> Vec2 {
        let mut x = n_dist.x;
        let mut y = n_dist.y;

        let iters = if self.iters == 0 { 8 } else { self.iters };
        for _ in 0..iters {
            let (xd, yd) = self.distort_impl(x, y);
            x -= xd - n_dist.x;
            y -= yd - n_dist.y;
        }
        Vec2::new(x, y)
    }
}
