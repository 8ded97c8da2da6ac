/// Add one bias-corrected rate step (rad/s over `dt` seconds) to an angle in degrees.
pub fn integrate(prev_angle: f64, rate: f64, bias: f64, dt: f64) -> f64 {
    prev_angle + (rate - bias) * dt.to_degrees()
}

/// Tracks the time of the previous update so each tick gets a real dt.
///
/// The first call to [`advance`](Self::advance) only seeds the clock and
/// produces no angle delta.
#[derive(Debug, Clone, Copy, Default)]
pub struct GyroIntegrator {
    last_update: Option<f64>,
}

impl GyroIntegrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `now` (seconds) and return the elapsed time since the previous
    /// call, or `None` on the first call. Backwards time yields `Some(0.0)`.
    pub fn advance(&mut self, now: f64) -> Option<f64> {
        let dt = self.peek(now);
        self.last_update = Some(now);
        dt
    }

    /// Elapsed time [`advance`](Self::advance) would return, without recording `now`.
    pub fn peek(&self, now: f64) -> Option<f64> {
        self.last_update.map(|last| (now - last).max(0.0))
    }

    pub fn last_update(&self) -> Option<f64> {
        self.last_update
    }

    pub fn reset(&mut self) {
        self.last_update = None;
    }
}
