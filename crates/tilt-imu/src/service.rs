use crate::clock::Clock;
use crate::error::{ServiceError, TrackerError};
use crate::provider::SensorProvider;
use crate::tracker::{TickOutcome, Tracker, TrackerStatus};
use crate::types::{AngleSample, SensorKind, TrackingMode};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Commands sent to the tracker task.
enum Command {
    StartCalibration(SensorKind, oneshot::Sender<Result<(), TrackerError>>),
    CancelCalibration,
    StartTracking(TrackingMode, oneshot::Sender<Result<(), TrackerError>>),
    StopTracking,
    Snapshot(oneshot::Sender<Vec<AngleSample>>),
}

enum Event {
    Command(Option<Command>),
    Tick,
    Deadline,
}

/// Handle to a tracker running on its own tokio task.
///
/// The task owns the [`Tracker`], drives its ticks from a timer while a
/// calibration or run is active, and publishes the latest status.
pub struct TrackerHandle {
    status_rx: watch::Receiver<TrackerStatus>,
    command_tx: mpsc::UnboundedSender<Command>,
    _task: tokio::task::JoinHandle<()>,
}

impl TrackerHandle {
    /// Move `tracker` onto a background task. Must be called inside a tokio runtime.
    pub fn spawn<P, C>(tracker: Tracker<P, C>) -> Self
    where
        P: SensorProvider + 'static,
        C: Clock + 'static,
    {
        let (status_tx, status_rx) = watch::channel(tracker.status());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(tracker_loop(tracker, status_tx, command_rx));

        Self {
            status_rx,
            command_tx,
            _task: task,
        }
    }

    pub async fn start_calibration(&self, kind: SensorKind) -> Result<(), ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::StartCalibration(kind, tx))?;
        Ok(rx.await.map_err(|_| ServiceError::Closed)??)
    }

    pub fn cancel_calibration(&self) {
        let _ = self.command_tx.send(Command::CancelCalibration);
    }

    pub async fn start_tracking(&self, mode: TrackingMode) -> Result<(), ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::StartTracking(mode, tx))?;
        Ok(rx.await.map_err(|_| ServiceError::Closed)??)
    }

    pub fn stop_tracking(&self) {
        let _ = self.command_tx.send(Command::StopTracking);
    }

    /// Copy of the current (or last) session.
    pub async fn snapshot(&self) -> Result<Vec<AngleSample>, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx))?;
        rx.await.map_err(|_| ServiceError::Closed)
    }

    /// Latest published status (non-blocking).
    pub fn status(&self) -> TrackerStatus {
        *self.status_rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<TrackerStatus> {
        self.status_rx.clone()
    }

    /// Wait until the tracker is idle again, e.g. after a calibration completes
    /// or a run expires.
    pub async fn wait_until_idle(&self) -> Result<TrackerStatus, ServiceError> {
        let mut rx = self.status_rx.clone();
        let status = rx
            .wait_for(|s| s.state.is_idle())
            .await
            .map_err(|_| ServiceError::Closed)?;
        Ok(*status)
    }

    fn send(&self, command: Command) -> Result<(), ServiceError> {
        self.command_tx.send(command).map_err(|_| ServiceError::Closed)
    }
}

/// Background task: serialize commands, ticks and the run deadline.
async fn tracker_loop<P: SensorProvider, C: Clock>(
    mut tracker: Tracker<P, C>,
    status_tx: watch::Sender<TrackerStatus>,
    mut command_rx: mpsc::UnboundedReceiver<Command>,
) {
    let mut ticker: Option<(Duration, Interval)> = None;

    loop {
        sync_ticker(&tracker, &mut ticker);
        let deadline = tracker.remaining().and_then(|r| Instant::now().checked_add(r));

        let event = tokio::select! {
            command = command_rx.recv() => Event::Command(command),
            _ = next_tick(&mut ticker) => Event::Tick,
            _ = wait_until(deadline) => Event::Deadline,
        };

        match event {
            Event::Command(None) => break,
            Event::Command(Some(command)) => handle_command(&mut tracker, &status_tx, command),
            Event::Tick => {
                if let TickOutcome::CalibrationFailed { kind, error } = tracker.tick() {
                    tracing::warn!(%kind, %error, "Calibration run failed");
                }
            }
            Event::Deadline => {
                tracing::info!("Maximum run duration reached");
                tracker.stop_tracking();
            }
        }

        status_tx.send_replace(tracker.status());
    }

    tracker.stop_tracking();
    tracker.cancel_calibration();
    tracing::debug!("Tracker task finished");
}

fn handle_command<P: SensorProvider, C: Clock>(
    tracker: &mut Tracker<P, C>,
    status_tx: &watch::Sender<TrackerStatus>,
    command: Command,
) {
    match command {
        Command::StartCalibration(kind, reply) => {
            let result = tracker.start_calibration(kind);
            // Publish before replying so waiters never see the stale idle state.
            status_tx.send_replace(tracker.status());
            let _ = reply.send(result);
        }
        Command::CancelCalibration => tracker.cancel_calibration(),
        Command::StartTracking(mode, reply) => {
            let result = tracker.start_tracking(mode);
            status_tx.send_replace(tracker.status());
            let _ = reply.send(result);
        }
        Command::StopTracking => tracker.stop_tracking(),
        Command::Snapshot(reply) => {
            let _ = reply.send(tracker.snapshot());
        }
    }
}

/// Keep the timer in step with the tracker: running at the state's interval
/// while active, absent while idle.
fn sync_ticker<P: SensorProvider, C: Clock>(
    tracker: &Tracker<P, C>,
    ticker: &mut Option<(Duration, Interval)>,
) {
    let wanted = tracker.is_active().then(|| tracker.tick_interval());
    let current = ticker.as_ref().map(|(period, _)| *period);
    if wanted == current {
        return;
    }
    *ticker = wanted.map(|period| {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        (period, interval)
    });
}

async fn next_tick(ticker: &mut Option<(Duration, Interval)>) {
    match ticker {
        Some((_, interval)) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
