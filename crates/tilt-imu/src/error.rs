use crate::types::{SensorKind, TrackerState};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackerError {
    #[error("Calibration needs {required} samples, got {actual}")]
    InsufficientSamples { required: usize, actual: usize },
    #[error("Tracker is busy ({0})")]
    AlreadyActive(TrackerState),
    #[error("No fresh {0} sample available")]
    SensorUnavailable(SensorKind),
    #[error("Accelerometer vector has zero magnitude")]
    DegenerateGeometry,
}

/// Failures talking to a [`TrackerHandle`](crate::service::TrackerHandle).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Tracker(#[from] TrackerError),
    #[error("Tracker task has stopped")]
    Closed,
}

impl TrackerError {
    /// The sensor this error concerns, if any.
    pub fn sensor(&self) -> Option<SensorKind> {
        match self {
            TrackerError::SensorUnavailable(kind) => Some(*kind),
            _ => None,
        }
    }
}
