use fieldcal_core::{CameraModelKind, Real};
use fieldcal_optim::{CalibrationMode, LmOutcome};
use serde::{Deserialize, Serialize};

/// Summary of one calibration pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub mode: CalibrationMode,
    pub model_kind: CameraModelKind,
    /// RMS pixel error after the pass; `-1` when the pass failed.
    pub rmse: Real,
    /// Termination of the damped solver (quaternion model only).
    pub outcome: Option<LmOutcome>,
    pub converged: bool,
    pub initial_chi2: Real,
    pub final_chi2: Real,
    pub iterations: usize,
    pub corner_count: usize,
    /// Segment parameters estimated alongside the camera.
    pub alpha_count: usize,
    /// Mirror flips applied to fold a negative focal length back.
    pub flips: usize,
}

impl CalibrationReport {
    /// Report for a pass that left the model untouched.
    pub fn failed(mode: CalibrationMode, model_kind: CameraModelKind) -> Self {
        Self {
            mode,
            model_kind,
            rmse: -1.0,
            outcome: None,
            converged: false,
            initial_chi2: 0.0,
            final_chi2: 0.0,
            iterations: 0,
            corner_count: 0,
            alpha_count: 0,
            flips: 0,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.rmse < 0.0
    }
}

/// Summary of one multi-view chessboard calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicsReport {
    /// RMS pixel error per corner after the solve; `-1` when it failed.
    pub rms: Real,
    pub initial_rms: Real,
    pub converged: bool,
    pub iterations: usize,
    pub sample_count: usize,
}

impl IntrinsicsReport {
    /// Report for a calibration that left the intrinsics untouched.
    pub fn failed(sample_count: usize) -> Self {
        Self {
            rms: -1.0,
            initial_rms: -1.0,
            converged: false,
            iterations: 0,
            sample_count,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.rms < 0.0
    }
}
