use crate::calibration::CalibrationSet;
use crate::error::TrackerError;
use crate::gyro::integrate;
use crate::tilt::{tilt, Tilt};
use crate::types::{RawSamples, SensorKind, TrackingMode, Vector3};
use serde::{Deserialize, Serialize};

/// Default gyro weight of the complementary filter, tuned for a 20 ms tick.
pub const DEFAULT_ALPHA: f64 = 0.99;
/// Default weight of a new reading in the accelerometer low-pass stage.
pub const DEFAULT_SMOOTHING_BETA: f64 = 0.2;

/// Sign applied to bias-corrected angular rate before it is integrated.
///
/// Boards disagree on whether a positive x rate raises or lowers the
/// accelerometer pitch; this lets the two be brought into agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GyroSign {
    #[default]
    Direct,
    Inverted,
}

impl GyroSign {
    pub fn factor(self) -> f64 {
        match self {
            GyroSign::Direct => 1.0,
            GyroSign::Inverted => -1.0,
        }
    }
}

/// Complementary filter tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    /// Weight of the gyro-propagated estimate, `0..=1`.
    pub alpha: f64,
    /// Low-pass weight for the accelerometer reference; `None` feeds raw tilt.
    pub smoothing: Option<f64>,
    pub gyro_sign: GyroSign,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            smoothing: None,
            gyro_sign: GyroSign::Direct,
        }
    }
}

/// One complementary filter step for a single axis, in degrees.
///
/// `alpha` is matched to a fixed tick length. Running the filter at a
/// different interval shifts its cutoff frequency.
pub fn fuse(prev_fused: f64, gyro_rate: f64, bias: f64, dt: f64, accel_angle: f64, alpha: f64) -> f64 {
    let gyro_delta = (gyro_rate - bias) * dt.to_degrees();
    alpha * (prev_fused + gyro_delta) + (1.0 - alpha) * accel_angle
}

/// Length of the (pitch, roll) tilt vector.
pub fn tilt_magnitude(x: f64, y: f64) -> f64 {
    x.hypot(y)
}

/// First-order low-pass filter. The first input passes through unchanged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LowPass {
    beta: f64,
    value: Option<f64>,
}

impl LowPass {
    pub fn new(beta: f64) -> Self {
        Self {
            beta: beta.clamp(0.0, 1.0),
            value: None,
        }
    }

    pub fn update(&mut self, raw: f64) -> f64 {
        let next = match self.value {
            Some(prev) => self.beta * raw + (1.0 - self.beta) * prev,
            None => raw,
        };
        self.value = Some(next);
        next
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

/// Per-run accumulators, reset at the start of every tracking run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionState {
    /// Cumulative gyro-only angle (pitch, roll).
    pub gyro_x: f64,
    pub gyro_y: f64,
    /// Cumulative complementary angle (pitch, roll).
    pub fused_x: f64,
    pub fused_y: f64,
    /// Smoothed accelerometer reference, when smoothing is enabled.
    smoothed: Option<(LowPass, LowPass)>,
    tilt_magnitude: f64,
}

impl FusionState {
    pub fn new(params: &FilterParams) -> Self {
        Self {
            gyro_x: 0.0,
            gyro_y: 0.0,
            fused_x: 0.0,
            fused_y: 0.0,
            smoothed: params.smoothing.map(|beta| (LowPass::new(beta), LowPass::new(beta))),
            tilt_magnitude: 0.0,
        }
    }

    pub fn tilt_magnitude(&self) -> f64 {
        self.tilt_magnitude
    }

    /// Smoothed accelerometer reference (pitch, roll), if any reading went in.
    pub fn smoothed_reference(&self) -> Option<(f64, f64)> {
        let (x, y) = self.smoothed.as_ref()?;
        Some((x.value()?, y.value()?))
    }

    /// Advance the state by one tick and return (angle_x, angle_y) in degrees.
    ///
    /// `dt` is `None` on the first tick of a run; gyro terms then contribute
    /// nothing. Fails without touching the state if a sample the mode needs is
    /// missing.
    pub fn step(
        &mut self,
        mode: TrackingMode,
        dt: Option<f64>,
        samples: &RawSamples,
        calibration: &CalibrationSet,
        params: &FilterParams,
    ) -> Result<(f64, f64), TrackerError> {
        let accel = match (mode.uses_accelerometer(), samples.accel) {
            (true, None) => return Err(TrackerError::SensorUnavailable(SensorKind::Accelerometer)),
            (_, accel) => accel,
        };
        let gyro = match (mode.uses_gyroscope(), samples.gyro) {
            (true, None) => return Err(TrackerError::SensorUnavailable(SensorKind::Gyroscope)),
            (_, gyro) => gyro,
        };

        let dt = dt.unwrap_or(0.0);
        let sign = params.gyro_sign.factor();
        let gyro_bias = calibration.bias(SensorKind::Gyroscope);

        if let Some(rate) = gyro {
            self.gyro_x = integrate(self.gyro_x, sign * rate.x, sign * gyro_bias.x, dt);
            self.gyro_y = integrate(self.gyro_y, sign * rate.y, sign * gyro_bias.y, dt);
        }

        let angles = match mode {
            TrackingMode::Accelerometer => {
                let t = self.accel_tilt(accel, calibration);
                (t.pitch, t.roll)
            }
            TrackingMode::Gyroscope => (self.gyro_x, self.gyro_y),
            TrackingMode::Complementary => {
                let raw = self.accel_tilt(accel, calibration);
                let reference = match self.smoothed.as_mut() {
                    Some((x, y)) => Tilt {
                        pitch: x.update(raw.pitch),
                        roll: y.update(raw.roll),
                    },
                    None => raw,
                };
                let rate = gyro.unwrap_or_default();
                self.fused_x = fuse(
                    self.fused_x,
                    sign * rate.x,
                    sign * gyro_bias.x,
                    dt,
                    reference.pitch,
                    params.alpha,
                );
                self.fused_y = fuse(
                    self.fused_y,
                    sign * rate.y,
                    sign * gyro_bias.y,
                    dt,
                    reference.roll,
                    params.alpha,
                );
                self.tilt_magnitude = tilt_magnitude(self.fused_x, self.fused_y);
                (self.fused_x, self.fused_y)
            }
        };

        Ok(angles)
    }

    fn accel_tilt(&self, accel: Option<Vector3>, calibration: &CalibrationSet) -> Tilt {
        accel
            .map(|a| tilt(a, calibration.bias(SensorKind::Accelerometer)))
            .unwrap_or_default()
    }
}
