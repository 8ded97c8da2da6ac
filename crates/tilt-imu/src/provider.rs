//! Sensor sources for the tracker.
//!
//! The tracker only ever asks for the *latest* reading of each sensor. A
//! provider that receives readings faster than the tick rate keeps
//! overwriting a single slot; nothing is queued.

use crate::clock::Clock;
use crate::error::TrackerError;
use crate::types::{Reading, SensorKind, Vector3};
use std::f64::consts::TAU;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Access to accelerometer and gyroscope readings.
///
/// Sensors that have not been started report `None`.
pub trait SensorProvider: Send {
    /// Latest reading of `kind` with its delivery number. Reading does not
    /// consume it.
    fn reading(&self, kind: SensorKind) -> Option<Reading>;
    fn start_accelerometer(&mut self, interval: Duration) -> Result<(), TrackerError>;
    fn start_gyroscope(&mut self, interval: Duration) -> Result<(), TrackerError>;
    /// Stop every sensor.
    fn stop(&mut self);

    fn latest(&self, kind: SensorKind) -> Option<Vector3> {
        self.reading(kind).map(|r| r.value)
    }

    fn latest_accelerometer(&self) -> Option<Vector3> {
        self.latest(SensorKind::Accelerometer)
    }

    fn latest_gyroscope(&self) -> Option<Vector3> {
        self.latest(SensorKind::Gyroscope)
    }

    fn start(&mut self, kind: SensorKind, interval: Duration) -> Result<(), TrackerError> {
        match kind {
            SensorKind::Accelerometer => self.start_accelerometer(interval),
            SensorKind::Gyroscope => self.start_gyroscope(interval),
        }
    }
}

struct Channel {
    value: watch::Sender<Option<Reading>>,
    interval: watch::Sender<Option<Duration>>,
}

impl Channel {
    fn new() -> Self {
        Self {
            value: watch::Sender::new(None),
            interval: watch::Sender::new(None),
        }
    }

    fn is_started(&self) -> bool {
        self.interval.borrow().is_some()
    }
}

struct Channels {
    accel: Channel,
    gyro: Channel,
}

impl Channels {
    fn get(&self, kind: SensorKind) -> &Channel {
        match kind {
            SensorKind::Accelerometer => &self.accel,
            SensorKind::Gyroscope => &self.gyro,
        }
    }
}

/// Push side of a [`FeedProvider`], handed to whatever delivers sensor readings.
#[derive(Clone)]
pub struct SensorFeed {
    channels: Arc<Channels>,
}

impl SensorFeed {
    /// Store a reading. Ignored while the sensor is stopped.
    pub fn push(&self, kind: SensorKind, reading: Vector3) -> bool {
        let channel = self.channels.get(kind);
        if !channel.is_started() {
            return false;
        }
        channel.value.send_modify(|slot| {
            let seq = slot.map_or(1, |last| last.seq + 1);
            *slot = Some(Reading {
                seq,
                value: reading,
            });
        });
        true
    }

    pub fn push_accelerometer(&self, reading: Vector3) -> bool {
        self.push(SensorKind::Accelerometer, reading)
    }

    pub fn push_gyroscope(&self, reading: Vector3) -> bool {
        self.push(SensorKind::Gyroscope, reading)
    }

    /// Requested delivery interval for `kind`; `None` while stopped.
    pub fn requested_interval(&self, kind: SensorKind) -> Option<Duration> {
        *self.channels.get(kind).interval.borrow()
    }

    /// Notifications of start/stop requests, for drivers that power sensors on demand.
    pub fn watch_interval(&self, kind: SensorKind) -> watch::Receiver<Option<Duration>> {
        self.channels.get(kind).interval.subscribe()
    }
}

/// Latest-value cache fed through a [`SensorFeed`].
pub struct FeedProvider {
    channels: Arc<Channels>,
}

impl FeedProvider {
    pub fn new() -> (Self, SensorFeed) {
        let channels = Arc::new(Channels {
            accel: Channel::new(),
            gyro: Channel::new(),
        });
        (
            Self {
                channels: channels.clone(),
            },
            SensorFeed { channels },
        )
    }

    fn begin(&mut self, kind: SensorKind, interval: Duration) -> Result<(), TrackerError> {
        let channel = self.channels.get(kind);
        // Readings from a previous acquisition are stale; numbering restarts.
        channel.value.send_replace(None);
        channel.interval.send_replace(Some(interval));
        tracing::debug!(%kind, ?interval, "Sensor started");
        Ok(())
    }
}

impl SensorProvider for FeedProvider {
    fn reading(&self, kind: SensorKind) -> Option<Reading> {
        let channel = self.channels.get(kind);
        if !channel.is_started() {
            return None;
        }
        *channel.value.borrow()
    }

    fn start_accelerometer(&mut self, interval: Duration) -> Result<(), TrackerError> {
        self.begin(SensorKind::Accelerometer, interval)
    }

    fn start_gyroscope(&mut self, interval: Duration) -> Result<(), TrackerError> {
        self.begin(SensorKind::Gyroscope, interval)
    }

    fn stop(&mut self) {
        for channel in [&self.channels.accel, &self.channels.gyro] {
            channel.interval.send_replace(None);
            channel.value.send_replace(None);
        }
        tracing::debug!("Sensors stopped");
    }
}

/// Motion of the simulated device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationParams {
    /// Peak pitch of the rocking motion in degrees.
    pub pitch_amplitude_deg: f64,
    /// Peak roll of the rocking motion in degrees.
    pub roll_amplitude_deg: f64,
    /// Seconds per rocking cycle.
    pub period_secs: f64,
    /// Constant offset added to every accelerometer reading.
    pub accel_bias: Vector3,
    /// Constant offset added to every gyroscope reading (rad/s).
    pub gyro_bias: Vector3,
    /// Amplitude of the high-frequency ripple on both sensors.
    pub ripple: f64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            pitch_amplitude_deg: 20.0,
            roll_amplitude_deg: 10.0,
            period_secs: 4.0,
            accel_bias: Vector3::new(0.01, -0.02, 0.015),
            gyro_bias: Vector3::new(0.004, -0.003, 0.002),
            ripple: 0.005,
        }
    }
}

impl SimulationParams {
    /// A device lying flat and still, apart from bias and ripple.
    pub fn stationary() -> Self {
        Self {
            pitch_amplitude_deg: 0.0,
            roll_amplitude_deg: 0.0,
            ..Self::default()
        }
    }
}

/// Synthetic device that rocks about x and y, read off a [`Clock`].
///
/// Readings are a pure function of time so runs are reproducible. A new
/// reading is delivered on every multiple of the requested interval.
pub struct SimulatedProvider<C> {
    clock: C,
    params: SimulationParams,
    accel_interval: Option<Duration>,
    gyro_interval: Option<Duration>,
}

impl<C: Clock> SimulatedProvider<C> {
    pub fn new(clock: C, params: SimulationParams) -> Self {
        Self {
            clock,
            params,
            accel_interval: None,
            gyro_interval: None,
        }
    }

    /// True (pitch, roll) in degrees at `t`.
    pub fn attitude_at(&self, t: f64) -> (f64, f64) {
        let phase = TAU * t / self.params.period_secs;
        (
            self.params.pitch_amplitude_deg * phase.sin(),
            self.params.roll_amplitude_deg * phase.cos(),
        )
    }

    fn ripple(&self, t: f64, seed: f64) -> f64 {
        self.params.ripple * (t * 157.0 + seed).sin() * (t * 23.0 + 2.0 * seed).cos()
    }

    fn accel_at(&self, t: f64) -> Vector3 {
        let (pitch, roll) = self.attitude_at(t);
        let (pitch, roll) = (pitch.to_radians(), roll.to_radians());
        // Unit gravity vector whose tilt decomposition gives back (pitch, roll);
        // -1 g on z when level.
        let (sp, sr) = (pitch.sin(), roll.sin());
        let gravity = Vector3::new(-sr, sp, -(1.0 - sp * sp - sr * sr).max(0.0).sqrt());
        let ripple = Vector3::new(self.ripple(t, 0.0), self.ripple(t, 1.0), self.ripple(t, 2.0));
        gravity + self.params.accel_bias + ripple
    }

    fn gyro_at(&self, t: f64) -> Vector3 {
        let omega = TAU / self.params.period_secs;
        let phase = omega * t;
        let rate = Vector3::new(
            self.params.pitch_amplitude_deg.to_radians() * omega * phase.cos(),
            -self.params.roll_amplitude_deg.to_radians() * omega * phase.sin(),
            0.0,
        );
        let ripple = Vector3::new(self.ripple(t, 3.0), self.ripple(t, 4.0), self.ripple(t, 5.0));
        rate + self.params.gyro_bias + ripple
    }
}

/// Index of the delivery slot `t` falls in. The small bias keeps exact
/// multiples of the interval from rounding down.
fn slot_index(t: f64, interval: Duration) -> u64 {
    let period = interval.as_secs_f64().max(1e-6);
    (t / period + 1e-6).floor().max(0.0) as u64
}

impl<C: Clock> SensorProvider for SimulatedProvider<C> {
    fn reading(&self, kind: SensorKind) -> Option<Reading> {
        let t = self.clock.elapsed();
        let (interval, value) = match kind {
            SensorKind::Accelerometer => (self.accel_interval?, self.accel_at(t)),
            SensorKind::Gyroscope => (self.gyro_interval?, self.gyro_at(t)),
        };
        Some(Reading {
            seq: slot_index(t, interval),
            value,
        })
    }

    fn start_accelerometer(&mut self, interval: Duration) -> Result<(), TrackerError> {
        self.accel_interval = Some(interval);
        Ok(())
    }

    fn start_gyroscope(&mut self, interval: Duration) -> Result<(), TrackerError> {
        self.gyro_interval = Some(interval);
        Ok(())
    }

    fn stop(&mut self) {
        self.accel_interval = None;
        self.gyro_interval = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::tilt::tilt;

    const INTERVAL: Duration = Duration::from_millis(20);

    #[test]
    fn feed_ignores_stopped_sensors() {
        let (mut provider, feed) = FeedProvider::new();
        assert!(!feed.push_accelerometer(Vector3::ONE));
        assert_eq!(provider.latest_accelerometer(), None);

        provider.start_accelerometer(INTERVAL).unwrap();
        assert_eq!(feed.requested_interval(SensorKind::Accelerometer), Some(INTERVAL));
        assert_eq!(feed.requested_interval(SensorKind::Gyroscope), None);
        assert!(feed.push_accelerometer(Vector3::ONE));
        assert_eq!(provider.latest_accelerometer(), Some(Vector3::ONE));
        assert_eq!(provider.latest_gyroscope(), None);
    }

    #[test]
    fn feed_keeps_only_latest_value() {
        let (mut provider, feed) = FeedProvider::new();
        provider.start_gyroscope(INTERVAL).unwrap();
        for i in 0..10 {
            feed.push_gyroscope(Vector3::splat(i as f64));
        }
        assert_eq!(provider.latest_gyroscope(), Some(Vector3::splat(9.0)));
        // Reading does not consume.
        assert_eq!(provider.latest_gyroscope(), Some(Vector3::splat(9.0)));
    }

    #[test]
    fn every_push_gets_a_new_number() {
        let (mut provider, feed) = FeedProvider::new();
        provider.start_gyroscope(INTERVAL).unwrap();
        feed.push_gyroscope(Vector3::ONE);
        let first = provider.reading(SensorKind::Gyroscope).unwrap();
        assert_eq!(provider.reading(SensorKind::Gyroscope), Some(first));

        // Same value twice is still two readings.
        feed.push_gyroscope(Vector3::ONE);
        let second = provider.reading(SensorKind::Gyroscope).unwrap();
        assert_eq!(second.seq, first.seq + 1);

        provider.stop();
        provider.start_gyroscope(INTERVAL).unwrap();
        feed.push_gyroscope(Vector3::ZERO);
        assert_eq!(provider.reading(SensorKind::Gyroscope).unwrap().seq, 1);
    }

    #[test]
    fn restart_discards_stale_reading() {
        let (mut provider, feed) = FeedProvider::new();
        provider.start_accelerometer(INTERVAL).unwrap();
        feed.push_accelerometer(Vector3::ONE);
        provider.stop();
        assert_eq!(feed.requested_interval(SensorKind::Accelerometer), None);

        provider.start_accelerometer(INTERVAL).unwrap();
        assert_eq!(provider.latest_accelerometer(), None);
    }

    #[test]
    fn watch_interval_sees_start_and_stop() {
        let (mut provider, feed) = FeedProvider::new();
        let mut rx = feed.watch_interval(SensorKind::Gyroscope);
        provider.start_gyroscope(INTERVAL).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), Some(INTERVAL));
        provider.stop();
        assert_eq!(*rx.borrow_and_update(), None);
    }

    #[test]
    fn simulated_device_reports_its_attitude() {
        let clock = ManualClock::new();
        let params = SimulationParams {
            accel_bias: Vector3::ZERO,
            ripple: 0.0,
            ..SimulationParams::default()
        };
        let mut provider = SimulatedProvider::new(clock.clone(), params);
        assert_eq!(provider.latest_accelerometer(), None);
        provider.start_accelerometer(INTERVAL).unwrap();

        for t in [0.0, 0.3, 1.0, 2.7] {
            clock.set(t);
            let (pitch, roll) = provider.attitude_at(t);
            let measured = tilt(provider.latest_accelerometer().unwrap(), Vector3::ZERO);
            assert!((measured.pitch - pitch).abs() < 1e-6);
            assert!((measured.roll - roll).abs() < 1e-6);
        }
    }

    #[test]
    fn simulated_readings_arrive_once_per_interval() {
        let clock = ManualClock::new();
        let mut provider = SimulatedProvider::new(clock.clone(), SimulationParams::default());
        provider.start_accelerometer(Duration::from_millis(10)).unwrap();

        let seq = |p: &SimulatedProvider<ManualClock>| p.reading(SensorKind::Accelerometer).unwrap().seq;
        let at_start = seq(&provider);
        clock.advance(0.004);
        assert_eq!(seq(&provider), at_start);
        clock.advance(0.006);
        assert_eq!(seq(&provider), at_start + 1);
        clock.advance(0.02);
        assert_eq!(seq(&provider), at_start + 3);
    }

    #[test]
    fn stationary_device_reads_bias() {
        let clock = ManualClock::new();
        let params = SimulationParams {
            ripple: 0.0,
            ..SimulationParams::stationary()
        };
        let mut provider = SimulatedProvider::new(clock, params);
        provider.start_gyroscope(INTERVAL).unwrap();
        assert_eq!(provider.latest_gyroscope(), Some(params.gyro_bias));
        provider.stop();
        assert_eq!(provider.latest_gyroscope(), None);
    }
}
