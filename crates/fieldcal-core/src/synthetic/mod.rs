//! Deterministic synthetic data for tests and demos.
//!
//! - [`noise`]: seeded uniform and Gaussian pixel noise,
//! - [`field`]: field scenes, overhead cameras and store population.
//!
//! # Example
//!
//! ```no_run
//! use fieldcal_core::synthetic::{field, noise::GaussianPixelNoise};
//! use fieldcal_core::{CorrespondenceStore, SimpleIntrinsics, Vec3};
//!
//! let scene = field::field_scene(9000.0, 6000.0, 500.0);
//! let cam = field::overhead_camera(Vec3::new(0.0, 0.0, 4000.0), 0.1, SimpleIntrinsics::default());
//! let mut store = CorrespondenceStore::new();
//! let noise = GaussianPixelNoise { seed: 1, sigma_px: 0.3 };
//! field::populate_store(&mut store, &scene, &cam, 8, &noise);
//! assert_eq!(store.corners().len(), 4);
//! ```

pub mod field;
pub mod noise;
