use anyhow::{Context, Result};
use tilt_config::AppConfig;
use tilt_imu::{
    tilt_magnitude, AngleSample, MonotonicClock, SensorKind, SimulatedProvider, Tracker,
    TrackerHandle, TrackingMode,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tilt_tracker=info,tilt_imu=info,tilt_config=info".into()),
        )
        .init();

    info!("Tilt tracker starting");

    let config = tilt_config::load_config().unwrap_or_else(|e| {
        warn!(?e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    let settings = config.tracker_settings()?;
    info!(
        mode = %config.tracking.mode,
        tick_ms = config.tracking.tick_interval_ms,
        max_secs = config.tracking.max_duration_secs,
        "Config loaded"
    );

    // No hardware backend yet: drive the tracker from the simulated device.
    let clock = MonotonicClock::new();
    let provider = SimulatedProvider::new(clock, config.simulation.params());
    let handle = TrackerHandle::spawn(Tracker::new(provider, clock, settings));

    for kind in [SensorKind::Accelerometer, SensorKind::Gyroscope] {
        if !calibrate(&handle, kind).await? {
            info!("Interrupted during calibration");
            return Ok(());
        }
    }

    let session = track(&handle, config.tracking.mode).await?;
    summarize(&session);

    if let Err(e) = tilt_config::save_config(&config) {
        warn!(?e, "Failed to save config");
    }

    Ok(())
}

/// Run one calibration to completion. Returns `false` if interrupted.
async fn calibrate(handle: &TrackerHandle, kind: SensorKind) -> Result<bool> {
    info!(%kind, "Calibrating, keep the device still");
    handle.start_calibration(kind).await?;

    let status = tokio::select! {
        status = handle.wait_until_idle() => status?,
        _ = tokio::signal::ctrl_c() => {
            handle.cancel_calibration();
            return Ok(false);
        }
    };

    let result = status
        .calibration
        .get(kind)
        .with_context(|| format!("{kind} calibration did not complete"))?;
    info!(
        %kind,
        bias = ?result.bias.to_array(),
        noise = ?result.noise.to_array(),
        "Calibration complete"
    );
    Ok(true)
}

/// Track until the run expires or Ctrl-C, then return the recorded session.
async fn track(handle: &TrackerHandle, mode: TrackingMode) -> Result<Vec<AngleSample>> {
    handle.start_tracking(mode).await?;
    info!(%mode, "Tracking, press Ctrl-C to stop");

    tokio::select! {
        status = handle.wait_until_idle() => {
            status?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Stopping");
            handle.stop_tracking();
            handle.wait_until_idle().await?;
        }
    }

    let status = handle.status();
    if status.health.total_misses > 0 {
        warn!(missed = status.health.total_misses, "Some ticks had no sensor data");
    }
    Ok(handle.snapshot().await?)
}

fn summarize(session: &[AngleSample]) {
    let Some(last) = session.last() else {
        warn!("No samples recorded");
        return;
    };
    let peak = session
        .iter()
        .map(|s| tilt_magnitude(s.angle_x, s.angle_y))
        .fold(0.0_f64, f64::max);

    info!(
        samples = session.len(),
        duration_secs = last.time_secs,
        angle_x = last.angle_x,
        angle_y = last.angle_y,
        peak_tilt = peak,
        "Session finished"
    );
}
