//! Two-axis tilt estimation from accelerometer and gyroscope samples.
//!
//! Calibrates each sensor from a stationary batch, turns readings into pitch
//! and roll (accelerometer geometry, gyro integration, or a complementary
//! blend of both) and records one angle sample per tick into a bounded
//! session.

pub mod calibration;
pub mod clock;
pub mod error;
pub mod fusion;
pub mod gyro;
pub mod provider;
pub mod service;
pub mod session;
pub mod tilt;
pub mod tracker;
pub mod types;

pub use calibration::{estimate, CalibrationSet};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use error::{ServiceError, TrackerError};
pub use fusion::{fuse, tilt_magnitude, FilterParams, FusionState, GyroSign};
pub use gyro::{integrate, GyroIntegrator};
pub use provider::{FeedProvider, SensorFeed, SensorProvider, SimulatedProvider, SimulationParams};
pub use service::TrackerHandle;
pub use session::{AdmissionPolicy, SessionBuffer};
pub use tilt::{tilt, Tilt};
pub use tracker::{SensorHealth, TickOutcome, Tracker, TrackerSettings, TrackerStatus};
pub use types::{
    AngleSample, CalibrationResult, RawSamples, Reading, SensorKind, TrackerState, TrackingMode,
    Vector3,
};
