use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Three-component reading used for raw samples, bias and noise.
pub type Vector3 = DVec3;

/// Which physical sensor a sample or calibration belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Accelerometer,
    Gyroscope,
}

impl SensorKind {
    /// Offset added to every sample before bias estimation.
    ///
    /// An accelerometer at rest reads -1 g on z, so +1 on z makes the resting
    /// bias come out near zero.
    pub fn axis_offset(self) -> Vector3 {
        match self {
            SensorKind::Accelerometer => Vector3::new(0.0, 0.0, 1.0),
            SensorKind::Gyroscope => Vector3::ZERO,
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorKind::Accelerometer => f.write_str("accelerometer"),
            SensorKind::Gyroscope => f.write_str("gyroscope"),
        }
    }
}

/// Source of the angles recorded during a tracking run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    /// Tilt from the gravity vector only.
    Accelerometer,
    /// Integrated angular rate only (drifts).
    Gyroscope,
    /// Complementary filter over both sensors.
    #[default]
    Complementary,
}

impl TrackingMode {
    pub fn uses_accelerometer(self) -> bool {
        matches!(self, TrackingMode::Accelerometer | TrackingMode::Complementary)
    }

    pub fn uses_gyroscope(self) -> bool {
        matches!(self, TrackingMode::Gyroscope | TrackingMode::Complementary)
    }
}

impl fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackingMode::Accelerometer => f.write_str("accelerometer"),
            TrackingMode::Gyroscope => f.write_str("gyroscope"),
            TrackingMode::Complementary => f.write_str("complementary"),
        }
    }
}

/// Bias and noise estimated for one sensor from a stationary batch.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CalibrationResult {
    /// Mean reading at rest (after the axis offset).
    pub bias: Vector3,
    /// Population standard deviation about the bias.
    pub noise: Vector3,
}

/// One recorded point of a tracking session.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AngleSample {
    /// Seconds since the run started.
    pub time_secs: f64,
    /// Pitch in degrees.
    pub angle_x: f64,
    /// Roll in degrees.
    pub angle_y: f64,
}

/// A sensor reading tagged with its delivery number.
///
/// `seq` grows with every reading a sensor delivers after being started, so a
/// reading whose `seq` was already seen carries no new information.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub seq: u64,
    pub value: Vector3,
}

/// Latest readings pulled from the provider for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawSamples {
    pub accel: Option<Vector3>,
    pub gyro: Option<Vector3>,
}

/// Orchestrator state. Calibration and tracking never overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackerState {
    #[default]
    Idle,
    Calibrating(SensorKind),
    Tracking(TrackingMode),
}

impl TrackerState {
    pub fn is_idle(&self) -> bool {
        matches!(self, TrackerState::Idle)
    }
}

impl fmt::Display for TrackerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerState::Idle => f.write_str("idle"),
            TrackerState::Calibrating(kind) => write!(f, "calibrating {kind}"),
            TrackerState::Tracking(mode) => write!(f, "tracking ({mode})"),
        }
    }
}
