use crate::calibration::{CalibrationCollector, CalibrationSet, DEFAULT_TOTAL_SAMPLES};
use crate::clock::Clock;
use crate::error::TrackerError;
use crate::fusion::{FilterParams, FusionState};
use crate::gyro::GyroIntegrator;
use crate::provider::SensorProvider;
use crate::session::{AdmissionPolicy, SessionBuffer};
use crate::types::{
    AngleSample, CalibrationResult, RawSamples, Reading, SensorKind, TrackerState, TrackingMode,
};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Tracker tuning. Defaults match a 50 Hz tick and a one-minute run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerSettings {
    /// Samples per calibration batch.
    pub total_samples: usize,
    /// Sensor delivery interval, also the calibration tick.
    pub sensor_interval: Duration,
    /// Tracking tick. `filter.alpha` is tuned against this.
    pub tick_interval: Duration,
    /// Runs stop by themselves after this long.
    pub max_duration: Duration,
    pub admission: AdmissionPolicy,
    pub filter: FilterParams,
    /// Log a warning every this many consecutive missed samples.
    pub miss_warn_threshold: u32,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            total_samples: DEFAULT_TOTAL_SAMPLES,
            sensor_interval: Duration::from_millis(10),
            tick_interval: Duration::from_millis(20),
            max_duration: Duration::from_secs(60),
            admission: AdmissionPolicy::default(),
            filter: FilterParams::default(),
            miss_warn_threshold: 25,
        }
    }
}

/// Missed-sample counters: ticks that found no reading, or none newer than
/// the one already used. Misses never end a run; they are reported here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorHealth {
    pub consecutive_misses: u32,
    pub total_misses: u64,
}

impl SensorHealth {
    pub fn is_degraded(&self, threshold: u32) -> bool {
        threshold > 0 && self.consecutive_misses >= threshold
    }
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Nothing active; the tick was ignored.
    Idle,
    /// A calibration sample went into the batch.
    Collected {
        kind: SensorKind,
        count: usize,
        total: usize,
    },
    /// The batch completed and the result is now current.
    Calibrated {
        kind: SensorKind,
        result: CalibrationResult,
    },
    CalibrationFailed {
        kind: SensorKind,
        error: TrackerError,
    },
    /// Angles computed and appended to the session.
    Recorded(AngleSample),
    /// Angles computed but refused by the admission policy.
    Rejected(AngleSample),
    /// No fresh reading from this sensor; nothing changed.
    Skipped(SensorKind),
    /// The run hit its maximum duration and was stopped.
    Expired,
}

/// Snapshot of the tracker for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrackerStatus {
    pub state: TrackerState,
    pub calibration: CalibrationSet,
    /// (collected, total) while calibrating.
    pub calibration_progress: Option<(usize, usize)>,
    pub last_sample: Option<AngleSample>,
    pub tilt_magnitude: f64,
    pub health: SensorHealth,
    pub session_len: usize,
}

struct ActiveRun {
    mode: TrackingMode,
    started_at: f64,
    fusion: FusionState,
    integrator: GyroIntegrator,
    ticks: u64,
}

/// Delivery numbers of the readings already consumed.
#[derive(Debug, Clone, Copy, Default)]
struct LastSeen {
    accel: Option<u64>,
    gyro: Option<u64>,
}

impl LastSeen {
    fn slot(&mut self, kind: SensorKind) -> &mut Option<u64> {
        match kind {
            SensorKind::Accelerometer => &mut self.accel,
            SensorKind::Gyroscope => &mut self.gyro,
        }
    }

    /// Record `reading` as used. Returns whether it had not been seen before.
    fn consume(&mut self, kind: SensorKind, reading: &Reading) -> bool {
        let slot = self.slot(kind);
        let fresh = *slot != Some(reading.seq);
        *slot = Some(reading.seq);
        fresh
    }
}

enum Activity {
    Idle,
    Calibrating(CalibrationCollector),
    Tracking(ActiveRun),
}

/// Calibration and tracking state machine.
///
/// Owns the provider, the current calibration, and the session of the latest
/// run. Every method takes `&mut self`, so ticks are serialized by whoever
/// owns the tracker.
pub struct Tracker<P, C> {
    provider: P,
    clock: C,
    settings: TrackerSettings,
    calibration: CalibrationSet,
    activity: Activity,
    session: SessionBuffer,
    health: SensorHealth,
    seen: LastSeen,
}

impl<P: SensorProvider, C: Clock> Tracker<P, C> {
    pub fn new(provider: P, clock: C, settings: TrackerSettings) -> Self {
        Self {
            provider,
            clock,
            session: SessionBuffer::new(settings.admission, settings.tick_interval),
            settings,
            calibration: CalibrationSet::default(),
            activity: Activity::Idle,
            health: SensorHealth::default(),
            seen: LastSeen::default(),
        }
    }

    pub fn state(&self) -> TrackerState {
        match &self.activity {
            Activity::Idle => TrackerState::Idle,
            Activity::Calibrating(collector) => TrackerState::Calibrating(collector.kind()),
            Activity::Tracking(run) => TrackerState::Tracking(run.mode),
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.activity, Activity::Idle)
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    pub fn calibration(&self, kind: SensorKind) -> Option<CalibrationResult> {
        self.calibration.get(kind)
    }

    /// Install a calibration obtained elsewhere.
    pub fn set_calibration(&mut self, kind: SensorKind, result: CalibrationResult) {
        self.calibration.set(kind, result);
    }

    pub fn session(&self) -> &SessionBuffer {
        &self.session
    }

    pub fn snapshot(&self) -> Vec<AngleSample> {
        self.session.snapshot()
    }

    pub fn health(&self) -> SensorHealth {
        self.health
    }

    /// Magnitude of the fused tilt; zero unless a complementary run is active.
    pub fn tilt_magnitude(&self) -> f64 {
        match &self.activity {
            Activity::Tracking(run) => run.fusion.tilt_magnitude(),
            _ => 0.0,
        }
    }

    /// Interval at which [`tick`](Self::tick) should be called in the current state.
    pub fn tick_interval(&self) -> Duration {
        match self.activity {
            Activity::Calibrating(_) => self.settings.sensor_interval,
            _ => self.settings.tick_interval,
        }
    }

    /// When the active run must stop, on this tracker's clock.
    pub fn deadline(&self) -> Option<f64> {
        match &self.activity {
            Activity::Tracking(run) => Some(run.started_at + self.settings.max_duration.as_secs_f64()),
            _ => None,
        }
    }

    /// Time left before the active run is force-stopped.
    pub fn remaining(&self) -> Option<Duration> {
        let deadline = self.deadline()?;
        let left = (deadline - self.clock.elapsed()).max(0.0);
        Some(Duration::try_from_secs_f64(left).unwrap_or(Duration::MAX))
    }

    pub fn status(&self) -> TrackerStatus {
        TrackerStatus {
            state: self.state(),
            calibration: self.calibration,
            calibration_progress: match &self.activity {
                Activity::Calibrating(c) => Some((c.count(), c.total())),
                _ => None,
            },
            last_sample: self.session.last().copied(),
            tilt_magnitude: self.tilt_magnitude(),
            health: self.health,
            session_len: self.session.len(),
        }
    }

    pub fn start_calibration(&mut self, kind: SensorKind) -> Result<(), TrackerError> {
        if self.is_active() {
            return Err(TrackerError::AlreadyActive(self.state()));
        }
        if self.settings.total_samples == 0 {
            return Err(TrackerError::InsufficientSamples {
                required: 1,
                actual: 0,
            });
        }

        if let Err(e) = self.provider.start(kind, self.settings.sensor_interval) {
            self.provider.stop();
            return Err(e);
        }

        self.health = SensorHealth::default();
        self.seen = LastSeen::default();
        self.activity = Activity::Calibrating(CalibrationCollector::new(kind, self.settings.total_samples));
        info!(%kind, total = self.settings.total_samples, "Calibration started");
        Ok(())
    }

    /// Abandon a calibration in progress. Partial samples are discarded and the
    /// previous result for that sensor stays current.
    pub fn cancel_calibration(&mut self) {
        if let Activity::Calibrating(collector) = &self.activity {
            info!(
                kind = %collector.kind(),
                collected = collector.count(),
                "Calibration cancelled"
            );
            self.provider.stop();
            self.activity = Activity::Idle;
        }
    }

    pub fn start_tracking(&mut self, mode: TrackingMode) -> Result<(), TrackerError> {
        if self.is_active() {
            return Err(TrackerError::AlreadyActive(self.state()));
        }

        if let Err(e) = self.start_sensors(mode) {
            self.provider.stop();
            return Err(e);
        }

        self.session.reset();
        self.health = SensorHealth::default();
        self.seen = LastSeen::default();
        self.activity = Activity::Tracking(ActiveRun {
            mode,
            started_at: self.clock.elapsed(),
            fusion: FusionState::new(&self.settings.filter),
            integrator: GyroIntegrator::new(),
            ticks: 0,
        });
        info!(
            %mode,
            max_duration = ?self.settings.max_duration,
            tick = ?self.settings.tick_interval,
            "Tracking started"
        );
        Ok(())
    }

    fn start_sensors(&mut self, mode: TrackingMode) -> Result<(), TrackerError> {
        let interval = self.settings.sensor_interval;
        if mode.uses_accelerometer() {
            self.provider.start_accelerometer(interval)?;
        }
        if mode.uses_gyroscope() {
            self.provider.start_gyroscope(interval)?;
        }
        Ok(())
    }

    /// End the active run. The session is kept for reading.
    pub fn stop_tracking(&mut self) {
        if let Activity::Tracking(run) = &self.activity {
            info!(
                mode = %run.mode,
                ticks = run.ticks,
                samples = self.session.len(),
                "Tracking stopped"
            );
            self.provider.stop();
            self.activity = Activity::Idle;
        }
    }

    /// Run one step of whatever is active.
    pub fn tick(&mut self) -> TickOutcome {
        match self.activity {
            Activity::Idle => TickOutcome::Idle,
            Activity::Calibrating(_) => self.tick_calibration(),
            Activity::Tracking(_) => self.tick_tracking(),
        }
    }

    fn tick_calibration(&mut self) -> TickOutcome {
        let Activity::Calibrating(collector) = &mut self.activity else {
            return TickOutcome::Idle;
        };
        let kind = collector.kind();

        // Each delivered reading counts once, however many ticks see it.
        let Some(reading) = self.provider.reading(kind) else {
            return self.record_miss(kind);
        };
        if !self.seen.consume(kind, &reading) {
            return self.record_miss(kind);
        }
        self.health.consecutive_misses = 0;

        let outcome = match collector.push(reading.value) {
            None => {
                return TickOutcome::Collected {
                    kind,
                    count: collector.count(),
                    total: collector.total(),
                }
            }
            Some(Ok(result)) => {
                self.calibration.set(kind, result);
                info!(
                    %kind,
                    bias_x = result.bias.x,
                    bias_y = result.bias.y,
                    bias_z = result.bias.z,
                    noise_x = result.noise.x,
                    noise_y = result.noise.y,
                    noise_z = result.noise.z,
                    "Calibration complete"
                );
                TickOutcome::Calibrated { kind, result }
            }
            Some(Err(error)) => {
                warn!(%kind, %error, "Calibration failed");
                TickOutcome::CalibrationFailed { kind, error }
            }
        };

        self.provider.stop();
        self.activity = Activity::Idle;
        outcome
    }

    fn tick_tracking(&mut self) -> TickOutcome {
        let now = self.clock.elapsed();
        let max = self.settings.max_duration.as_secs_f64();

        let Activity::Tracking(run) = &mut self.activity else {
            return TickOutcome::Idle;
        };

        let time_secs = (now - run.started_at).max(0.0);
        if time_secs > max {
            info!(elapsed = time_secs, "Maximum run duration reached");
            self.stop_tracking();
            return TickOutcome::Expired;
        }

        let accel = self
            .provider
            .reading(SensorKind::Accelerometer)
            .filter(|_| run.mode.uses_accelerometer());
        let gyro = self
            .provider
            .reading(SensorKind::Gyroscope)
            .filter(|_| run.mode.uses_gyroscope());
        let samples = RawSamples {
            accel: accel.map(|r| r.value),
            gyro: gyro.map(|r| r.value),
        };
        let dt = run.integrator.peek(now);
        let (angle_x, angle_y) = match run.fusion.step(
            run.mode,
            dt,
            &samples,
            &self.calibration,
            &self.settings.filter,
        ) {
            Ok(angles) => angles,
            Err(error) => {
                let kind = error.sensor().unwrap_or(SensorKind::Accelerometer);
                return self.record_miss(kind);
            }
        };
        run.integrator.advance(now);
        run.ticks += 1;
        if run.ticks % 500 == 0 {
            debug!(ticks = run.ticks, angle_x, angle_y, "Tracking heartbeat");
        }

        // Angles use the latest values; a repeated reading still counts as a miss.
        let mut stale = None;
        for (kind, reading) in [(SensorKind::Accelerometer, accel), (SensorKind::Gyroscope, gyro)] {
            if let Some(reading) = reading {
                if !self.seen.consume(kind, &reading) {
                    stale = Some(kind);
                }
            }
        }
        match stale {
            Some(kind) => self.count_miss(kind),
            None => self.health.consecutive_misses = 0,
        }

        let sample = AngleSample {
            time_secs,
            angle_x,
            angle_y,
        };
        if self.session.append(angle_x, angle_y, time_secs) {
            TickOutcome::Recorded(sample)
        } else {
            trace!(time_secs, "Sample refused by admission policy");
            TickOutcome::Rejected(sample)
        }
    }

    fn record_miss(&mut self, kind: SensorKind) -> TickOutcome {
        self.count_miss(kind);
        TickOutcome::Skipped(kind)
    }

    fn count_miss(&mut self, kind: SensorKind) {
        self.health.consecutive_misses = self.health.consecutive_misses.saturating_add(1);
        self.health.total_misses += 1;
        trace!(%kind, "No fresh sample");

        let threshold = self.settings.miss_warn_threshold;
        if self.health.is_degraded(threshold) && self.health.consecutive_misses % threshold == 0 {
            warn!(
                %kind,
                consecutive = self.health.consecutive_misses,
                total = self.health.total_misses,
                "Sensor not delivering samples"
            );
        }
    }
}
