use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

/// Monotonic time source in seconds.
pub trait Clock: Send + Sync {
    fn elapsed(&self) -> f64;
}

/// Seconds since construction, on tokio's clock so paused-time tests see it move.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn elapsed(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Hand-driven clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, secs: f64) {
        self.bits.store(secs.to_bits(), Ordering::Release);
    }

    pub fn advance(&self, secs: f64) {
        self.set(self.elapsed() + secs);
    }
}

impl Clock for ManualClock {
    fn elapsed(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}
