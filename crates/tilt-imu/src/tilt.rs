use crate::error::TrackerError;
use crate::types::Vector3;

/// Pitch and roll in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Tilt {
    pub pitch: f64,
    pub roll: f64,
}

/// Tilt of a bias-corrected accelerometer vector, assuming z is aligned with
/// gravity at rest.
///
/// Fails with [`TrackerError::DegenerateGeometry`] when the corrected vector
/// has no direction.
pub fn checked_tilt(accel: Vector3, bias: Vector3) -> Result<Tilt, TrackerError> {
    let v = accel - bias;
    if !v.is_finite() || v.length_squared() == 0.0 {
        return Err(TrackerError::DegenerateGeometry);
    }

    let pitch = v.y.atan2((v.x * v.x + v.z * v.z).sqrt()).to_degrees();
    let roll = (-v.x).atan2((v.y * v.y + v.z * v.z).sqrt()).to_degrees();

    Ok(Tilt { pitch, roll })
}

/// Tilt of a bias-corrected accelerometer vector, level for degenerate input.
pub fn tilt(accel: Vector3, bias: Vector3) -> Tilt {
    checked_tilt(accel, bias).unwrap_or_else(|_| {
        tracing::trace!(?accel, ?bias, "Degenerate accelerometer vector, reporting level");
        Tilt::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_device_has_no_tilt() {
        let t = tilt(Vector3::new(0.0, 0.0, -1.0), Vector3::ZERO);
        assert!(t.pitch.abs() < 1e-9);
        assert!(t.roll.abs() < 1e-9);
    }

    #[test]
    fn zero_vector_is_level_not_nan() {
        let t = tilt(Vector3::ZERO, Vector3::ZERO);
        assert_eq!(t, Tilt::default());
        assert_eq!(
            checked_tilt(Vector3::ZERO, Vector3::ZERO),
            Err(TrackerError::DegenerateGeometry)
        );
    }

    #[test]
    fn bias_equal_to_reading_is_degenerate() {
        let reading = Vector3::new(0.2, 0.1, -0.9);
        assert_eq!(tilt(reading, reading), Tilt::default());
    }

    #[test]
    fn gravity_on_y_is_ninety_degrees_pitch() {
        let t = tilt(Vector3::new(0.0, 1.0, 0.0), Vector3::ZERO);
        assert!((t.pitch - 90.0).abs() < 1e-9);
        assert!(t.roll.abs() < 1e-9);
    }

    #[test]
    fn gravity_on_x_is_negative_roll() {
        let t = tilt(Vector3::new(1.0, 0.0, 0.0), Vector3::ZERO);
        assert!((t.roll + 90.0).abs() < 1e-9);
        assert!(t.pitch.abs() < 1e-9);
    }

    #[test]
    fn forty_five_degree_pitch() {
        let t = tilt(Vector3::new(0.0, 1.0, -1.0), Vector3::ZERO);
        assert!((t.pitch - 45.0).abs() < 1e-9);
    }

    #[test]
    fn bias_is_subtracted() {
        let bias = Vector3::new(0.0, 0.5, 0.0);
        let t = tilt(Vector3::new(0.0, 0.5, -1.0), bias);
        assert!(t.pitch.abs() < 1e-9);
    }

    #[test]
    fn nan_input_is_level() {
        let t = tilt(Vector3::new(f64::NAN, 0.0, -1.0), Vector3::ZERO);
        assert_eq!(t, Tilt::default());
    }
}
