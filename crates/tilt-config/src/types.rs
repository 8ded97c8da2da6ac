use serde::{Deserialize, Serialize};
use std::time::Duration;
use tilt_imu::{
    AdmissionPolicy, FilterParams, GyroSign, SimulationParams, TrackerSettings, TrackingMode,
    Vector3,
};

/// Longest run a config may ask for: one week.
pub const MAX_RUN_SECS: f64 = 7.0 * 24.0 * 3600.0;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Calibration batch settings.
    pub calibration: CalibrationConfig,
    /// Sensor acquisition.
    pub sensors: SensorConfig,
    /// Tracking run settings.
    pub tracking: TrackingConfig,
    /// Complementary filter tuning.
    pub filter: FilterConfig,
    /// Motion of the simulated device used when no hardware is attached.
    pub simulation: SimulationConfig,
}

impl AppConfig {
    /// Reject values the tracker cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.calibration.total_samples > 0,
            "calibration.total_samples must be at least 1"
        );
        anyhow::ensure!(self.sensors.interval_ms > 0, "sensors.interval_ms must be positive");
        anyhow::ensure!(
            self.tracking.tick_interval_ms > 0,
            "tracking.tick_interval_ms must be positive"
        );
        anyhow::ensure!(
            self.tracking.max_duration_secs > 0.0 && self.tracking.max_duration_secs <= MAX_RUN_SECS,
            "tracking.max_duration_secs must be within 0..={MAX_RUN_SECS}, got {}",
            self.tracking.max_duration_secs
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.filter.alpha),
            "filter.alpha must be within 0..=1, got {}",
            self.filter.alpha
        );
        if let Some(beta) = self.filter.smoothing_beta {
            anyhow::ensure!(
                (0.0..=1.0).contains(&beta),
                "filter.smoothing_beta must be within 0..=1, got {beta}"
            );
        }
        anyhow::ensure!(
            self.simulation.period_secs > 0.0,
            "simulation.period_secs must be positive"
        );
        Ok(())
    }

    /// Engine settings for this config. Fails if the config does not validate.
    pub fn tracker_settings(&self) -> anyhow::Result<TrackerSettings> {
        self.validate()?;
        Ok(TrackerSettings {
            total_samples: self.calibration.total_samples,
            sensor_interval: Duration::from_millis(self.sensors.interval_ms),
            tick_interval: Duration::from_millis(self.tracking.tick_interval_ms),
            max_duration: Duration::from_secs_f64(self.tracking.max_duration_secs),
            admission: self.tracking.admission,
            filter: FilterParams {
                alpha: self.filter.alpha,
                smoothing: self.filter.smoothing_beta,
                gyro_sign: self.filter.gyro_sign,
            },
            miss_warn_threshold: self.tracking.miss_warn_threshold,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Stationary samples collected per sensor calibration.
    pub total_samples: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self { total_samples: 500 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Requested delivery interval for both sensors, in milliseconds.
    pub interval_ms: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self { interval_ms: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Fusion tick in milliseconds. Changing it without retuning `filter.alpha`
    /// moves the filter's cutoff frequency.
    pub tick_interval_ms: u64,
    /// Runs stop after this many seconds.
    pub max_duration_secs: f64,
    pub mode: TrackingMode,
    pub admission: AdmissionPolicy,
    /// Warn after this many consecutive ticks without a sensor reading (0 = never).
    pub miss_warn_threshold: u32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 20,
            max_duration_secs: 60.0,
            mode: TrackingMode::Complementary,
            admission: AdmissionPolicy::MinSpacing,
            miss_warn_threshold: 25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Gyro weight of the complementary filter. Higher = smoother, slower to
    /// correct drift.
    pub alpha: f64,
    /// Low-pass weight for the accelerometer reference. Absent = raw tilt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smoothing_beta: Option<f64>,
    pub gyro_sign: GyroSign,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            alpha: 0.99,
            smoothing_beta: None,
            gyro_sign: GyroSign::Direct,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub pitch_amplitude_deg: f64,
    pub roll_amplitude_deg: f64,
    pub period_secs: f64,
    #[serde(with = "vec3_serde")]
    pub accel_bias: Vector3,
    #[serde(with = "vec3_serde")]
    pub gyro_bias: Vector3,
    pub ripple: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationParams::default().into()
    }
}

impl From<SimulationParams> for SimulationConfig {
    fn from(p: SimulationParams) -> Self {
        Self {
            pitch_amplitude_deg: p.pitch_amplitude_deg,
            roll_amplitude_deg: p.roll_amplitude_deg,
            period_secs: p.period_secs,
            accel_bias: p.accel_bias,
            gyro_bias: p.gyro_bias,
            ripple: p.ripple,
        }
    }
}

impl SimulationConfig {
    pub fn params(&self) -> SimulationParams {
        SimulationParams {
            pitch_amplitude_deg: self.pitch_amplitude_deg,
            roll_amplitude_deg: self.roll_amplitude_deg,
            period_secs: self.period_secs,
            accel_bias: self.accel_bias,
            gyro_bias: self.gyro_bias,
            ripple: self.ripple,
        }
    }
}

// Vectors are written as plain `[x, y, z]` arrays in TOML.
mod vec3_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use tilt_imu::Vector3;

    pub fn serialize<S: Serializer>(v: &Vector3, s: S) -> Result<S::Ok, S::Error> {
        [v.x, v.y, v.z].serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vector3, D::Error> {
        let [x, y, z] = <[f64; 3]>::deserialize(d)?;
        Ok(Vector3::new(x, y, z))
    }
}
