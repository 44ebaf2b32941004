//! Seeded pixel noise for synthetic correspondences.
//!
//! Samples are a pure function of `(seed, stream, index)` so a test that
//! perturbs "corner 3" always gets the same offset, independent of how many
//! other samples were drawn before it.

use crate::{Pt2, Real, Vec2};

/// Uniform pixel noise in `[-max_abs_px, +max_abs_px]` per axis.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UniformPixelNoise {
    pub seed: u64,
    pub max_abs_px: Real,
}

impl UniformPixelNoise {
    pub fn sample(&self, stream: usize, index: usize) -> Vec2 {
        let max_abs = self.max_abs_px.abs();
        if max_abs == 0.0 {
            return Vec2::zeros();
        }
        let (u, v) = unit_pair(self.seed, stream, index);
        Vec2::new((u - 0.5) * 2.0 * max_abs, (v - 0.5) * 2.0 * max_abs)
    }

    pub fn apply(&self, stream: usize, index: usize, px: &Pt2) -> Pt2 {
        px + self.sample(stream, index)
    }
}

/// Zero-mean Gaussian pixel noise with per-axis standard deviation `sigma_px`
/// (Box–Muller on two uniform draws).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GaussianPixelNoise {
    pub seed: u64,
    pub sigma_px: Real,
}

impl GaussianPixelNoise {
    pub fn sample(&self, stream: usize, index: usize) -> Vec2 {
        if self.sigma_px == 0.0 {
            return Vec2::zeros();
        }
        let (u, v) = unit_pair(self.seed, stream, index);
        // u in (0, 1] keeps the log finite.
        let radius = (-2.0 * (1.0 - u).ln()).sqrt() * self.sigma_px;
        let angle = 2.0 * std::f64::consts::PI * v;
        Vec2::new(radius * angle.cos(), radius * angle.sin())
    }

    pub fn apply(&self, stream: usize, index: usize, px: &Pt2) -> Pt2 {
        px + self.sample(stream, index)
    }
}

fn unit_pair(seed: u64, stream: usize, index: usize) -> (Real, Real) {
    let key = seed
        ^ (stream as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (index as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    (
        to_unit(splitmix64(key)),
        to_unit(splitmix64(key ^ 0x94D0_49BB_1331_11EB)),
    )
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Top 53 bits as a double in `[0, 1)`.
fn to_unit(x: u64) -> Real {
    ((x >> 11) as Real) * (1.0 / ((1u64 << 53) as Real))
}
