use crate::error::TrackerError;
use crate::types::{CalibrationResult, SensorKind, Vector3};

/// Default number of stationary samples per calibration run.
pub const DEFAULT_TOTAL_SAMPLES: usize = 500;

/// Estimate bias and noise from a stationary batch.
///
/// Every sample is shifted by `axis_offset` first. Bias is the component-wise
/// mean, noise the population standard deviation about that mean (divided by
/// `n`, not `n - 1`).
pub fn estimate(samples: &[Vector3], axis_offset: Vector3) -> Result<CalibrationResult, TrackerError> {
    if samples.is_empty() {
        return Err(TrackerError::InsufficientSamples {
            required: 1,
            actual: 0,
        });
    }

    let n = samples.len() as f64;
    let sum: Vector3 = samples.iter().map(|s| *s + axis_offset).sum();
    let bias = sum / n;

    let squared: Vector3 = samples
        .iter()
        .map(|s| {
            let d = *s + axis_offset - bias;
            d * d
        })
        .sum();
    let variance = squared / n;
    let noise = Vector3::new(variance.x.sqrt(), variance.y.sqrt(), variance.z.sqrt());

    Ok(CalibrationResult { bias, noise })
}

/// Like [`estimate`], but rejects batches shorter than `required`.
pub fn estimate_exact(
    samples: &[Vector3],
    axis_offset: Vector3,
    required: usize,
) -> Result<CalibrationResult, TrackerError> {
    if required == 0 || samples.len() < required {
        return Err(TrackerError::InsufficientSamples {
            required: required.max(1),
            actual: samples.len(),
        });
    }
    estimate(&samples[..required], axis_offset)
}

/// Accumulates samples for one sensor until the configured total is reached.
#[derive(Debug, Clone)]
pub struct CalibrationCollector {
    kind: SensorKind,
    samples: Vec<Vector3>,
    total: usize,
}

impl CalibrationCollector {
    pub fn new(kind: SensorKind, total: usize) -> Self {
        Self {
            kind,
            samples: Vec::with_capacity(total),
            total,
        }
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Fraction of the batch collected so far, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.count() as f64 / self.total as f64).min(1.0)
    }

    /// Add one sample. Returns the estimate once the batch is complete.
    pub fn push(&mut self, sample: Vector3) -> Option<Result<CalibrationResult, TrackerError>> {
        if self.samples.len() < self.total {
            self.samples.push(sample);
        }
        if self.samples.len() >= self.total {
            Some(estimate_exact(
                &self.samples,
                self.kind.axis_offset(),
                self.total,
            ))
        } else {
            None
        }
    }
}

/// Current calibration for both sensors. Uncalibrated sensors have zero bias.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CalibrationSet {
    pub accelerometer: Option<CalibrationResult>,
    pub gyroscope: Option<CalibrationResult>,
}

impl CalibrationSet {
    pub fn get(&self, kind: SensorKind) -> Option<CalibrationResult> {
        match kind {
            SensorKind::Accelerometer => self.accelerometer,
            SensorKind::Gyroscope => self.gyroscope,
        }
    }

    /// Replace the whole result for `kind`.
    pub fn set(&mut self, kind: SensorKind, result: CalibrationResult) {
        match kind {
            SensorKind::Accelerometer => self.accelerometer = Some(result),
            SensorKind::Gyroscope => self.gyroscope = Some(result),
        }
    }

    pub fn bias(&self, kind: SensorKind) -> Vector3 {
        self.get(kind).map(|c| c.bias).unwrap_or(Vector3::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vector3, b: Vector3) -> bool {
        (a - b).abs().max_element() < 1e-9
    }

    #[test]
    fn identical_samples_have_zero_noise() {
        let samples = vec![Vector3::new(0.1, -0.2, 0.3); 50];
        let result = estimate(&samples, Vector3::ZERO).unwrap();
        assert!(close(result.bias, Vector3::new(0.1, -0.2, 0.3)));
        assert!(close(result.noise, Vector3::ZERO));
    }

    #[test]
    fn offset_is_applied_before_bias() {
        let samples = vec![Vector3::new(0.0, 0.0, -1.0); 10];
        let result = estimate(&samples, SensorKind::Accelerometer.axis_offset()).unwrap();
        assert!(result.bias.z.abs() < 1e-12);
        assert!(close(result.noise, Vector3::ZERO));
    }

    #[test]
    fn gravity_offset_centres_accelerometer_bias() {
        // Mean z of -1.0 with symmetric spread.
        let samples: Vec<Vector3> = (0..100)
            .map(|i| {
                let wobble = if i % 2 == 0 { 0.01 } else { -0.01 };
                Vector3::new(wobble, -wobble, -1.0 + wobble)
            })
            .collect();
        let result = estimate(&samples, SensorKind::Accelerometer.axis_offset()).unwrap();
        assert!(result.bias.z.abs() < 1e-9);
        assert!((result.noise.z - 0.01).abs() < 1e-9);
    }

    #[test]
    fn noise_is_population_standard_deviation() {
        let samples = [
            Vector3::new(2.0, 0.0, 0.0),
            Vector3::new(4.0, 0.0, 0.0),
            Vector3::new(4.0, 0.0, 0.0),
            Vector3::new(4.0, 0.0, 0.0),
            Vector3::new(5.0, 0.0, 0.0),
            Vector3::new(5.0, 0.0, 0.0),
            Vector3::new(7.0, 0.0, 0.0),
            Vector3::new(9.0, 0.0, 0.0),
        ];
        let result = estimate(&samples, Vector3::ZERO).unwrap();
        assert!((result.bias.x - 5.0).abs() < 1e-12);
        // Sample (Bessel) deviation would be ~2.138.
        assert!((result.noise.x - 2.0).abs() < 1e-12);
    }

    #[test]
    fn empty_batch_is_rejected() {
        let err = estimate(&[], Vector3::ZERO).unwrap_err();
        assert_eq!(
            err,
            TrackerError::InsufficientSamples {
                required: 1,
                actual: 0
            }
        );
    }

    #[test]
    fn short_batch_is_rejected() {
        let samples = vec![Vector3::ONE; 3];
        let err = estimate_exact(&samples, Vector3::ZERO, 5).unwrap_err();
        assert_eq!(
            err,
            TrackerError::InsufficientSamples {
                required: 5,
                actual: 3
            }
        );
    }

    #[test]
    fn collector_finishes_at_total() {
        let mut collector = CalibrationCollector::new(SensorKind::Gyroscope, 4);
        for _ in 0..3 {
            assert!(collector.push(Vector3::new(0.01, 0.02, 0.03)).is_none());
        }
        assert!((collector.progress() - 0.75).abs() < 1e-12);

        let result = collector.push(Vector3::new(0.01, 0.02, 0.03)).unwrap().unwrap();
        assert_eq!(collector.count(), 4);
        assert!(close(result.bias, Vector3::new(0.01, 0.02, 0.03)));
    }

    #[test]
    fn uncalibrated_set_has_zero_bias() {
        let mut set = CalibrationSet::default();
        assert_eq!(set.bias(SensorKind::Gyroscope), Vector3::ZERO);

        let result = CalibrationResult {
            bias: Vector3::new(0.1, 0.2, 0.3),
            noise: Vector3::splat(0.01),
        };
        set.set(SensorKind::Gyroscope, result);
        assert_eq!(set.get(SensorKind::Gyroscope), Some(result));
        assert_eq!(set.bias(SensorKind::Accelerometer), Vector3::ZERO);
    }

    #[test]
    fn accelerometer_collector_applies_gravity_offset() {
        let mut collector = CalibrationCollector::new(SensorKind::Accelerometer, 2);
        collector.push(Vector3::new(0.0, 0.0, -1.0));
        let result = collector.push(Vector3::new(0.0, 0.0, -1.0)).unwrap().unwrap();
        assert!(close(result.bias, Vector3::ZERO));
    }
}
