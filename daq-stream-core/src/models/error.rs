use thiserror::Error;

use super::state::SessionState;

/// Errors that can occur during acquisition operations.
///
/// A retrieval that times out with no scans is not an error; drivers report
/// it as `Ok(0)`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DaqError {
    #[error("no acquisition device available")]
    DeviceUnavailable,

    #[error("driver error {code}: {description}")]
    Driver { code: i32, description: String },

    #[error("{operation} is not valid in the {state} state")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("scan has {actual} samples, buffer expects {expected}")]
    ScanWidthMismatch { expected: usize, actual: usize },

    #[error("failed to load driver library: {0}")]
    LibraryLoad(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl DaqError {
    /// Shorthand for a driver failure.
    pub fn driver(code: i32, description: impl Into<String>) -> Self {
        Self::Driver {
            code,
            description: description.into(),
        }
    }

    /// Whether this error came from the hardware transport.
    pub fn is_driver_fault(&self) -> bool {
        matches!(self, Self::Driver { .. })
    }
}
