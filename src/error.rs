use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum GmcError {
    #[error("invalid motion estimator input")]
    InvalidInput,
    #[error("motion estimator did not converge")]
    NotConverged,
}

#[derive(Debug, Clone, Error)]
pub enum TrackError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("numerically degenerate update: {0}")]
    NumericDegenerate(String),
    #[error("backend failure: {0}")]
    BackendFailure(String),
    #[error("assignment error: {0}")]
    LapjvError(String),
}

/// Per-kind failure counters accumulated across `track()` calls.
///
/// No failure aborts a frame; each one degrades locally and bumps the
/// matching counter here so callers can watch input and numeric health.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Diagnostics {
    pub invalid_input: u64,
    pub numeric_degenerate: u64,
    pub backend_failure: u64,
}

impl Diagnostics {
    pub(crate) fn record(&mut self, error: &TrackError) {
        match error {
            TrackError::InvalidInput(_) => self.invalid_input += 1,
            TrackError::NumericDegenerate(_) => self.numeric_degenerate += 1,
            TrackError::BackendFailure(_) => self.backend_failure += 1,
            TrackError::LapjvError(_) => {}
        }
    }
}
