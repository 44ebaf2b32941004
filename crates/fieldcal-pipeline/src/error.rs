use fieldcal_core::StoreError;
use fieldcal_linear::HomographyError;
use fieldcal_optim::LmError;
use thiserror::Error;

/// Why a calibration pass did not update the camera model.
///
/// Every variant leaves the model exactly as it was before the call.
#[derive(Debug, Error, PartialEq)]
pub enum CalibrationError {
    #[error("not enough calibration data: need {required}, have {available}")]
    InsufficientData { required: usize, available: usize },
    #[error("numerical failure: {0}")]
    NumericalFailure(String),
    #[error("calibration library failure: {0}")]
    ExternalLibrary(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid chessboard sample: {0}")]
    InvalidSample(String),
    #[error("initialisation failed: {0}")]
    Initialisation(#[from] HomographyError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<LmError> for CalibrationError {
    fn from(err: LmError) -> Self {
        Self::NumericalFailure(err.to_string())
    }
}
