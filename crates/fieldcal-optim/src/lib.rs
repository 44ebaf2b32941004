//! Non-linear least squares for field camera calibration.
//!
//! Two solvers live here:
//! - [`LmSolver`], a damped Gauss-Newton loop over a zero-centred increment
//!   with forward-difference Jacobians, used for the quaternion model,
//! - [`LmBackend`], an adapter over the `levenberg-marquardt` crate used for
//!   the pinhole model and for multi-view target calibration.

pub mod backend_lm;
pub mod jacobian;
pub mod problems;
pub mod solver;
mod traits;

pub use crate::backend_lm::LmBackend;
pub use crate::problems::*;
pub use crate::solver::{IncrementalProblem, LmError, LmOptions, LmOutcome, LmReport, LmSolver, LmState};
pub use crate::traits::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};
