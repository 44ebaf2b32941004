pub mod lm;

pub use lm::{IncrementalProblem, LmError, LmOptions, LmOutcome, LmReport, LmSolver, LmState};
