//! Core geometry for overhead field cameras.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Pt3`, ...) and small
//!   geometric primitives (ray/plane, closest point on segment),
//! - the two camera models and their shared [`FieldProjection`] contract,
//! - the [`CorrespondenceStore`] of corner and line-segment observations,
//! - deterministic synthetic data helpers.
//!
//! Camera pipeline (both models):
//! `pixel = K ∘ distortion ∘ perspective ∘ (R · p_field + t)`

/// Linear algebra type aliases and helpers.
pub mod math;
/// Camera models, distortion and projection.
pub mod models;
/// Deterministic synthetic scenes and noise.
pub mod synthetic;
/// Correspondence bookkeeping.
pub mod types;

pub use math::*;
pub use models::*;
pub use types::*;
