use crate::types::AngleSample;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fraction of the tick interval two accepted samples must be apart under
/// [`AdmissionPolicy::MinSpacing`].
pub const MIN_SPACING_FRACTION: f64 = 0.9;

/// Rule deciding whether a tick's angles go into the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionPolicy {
    /// One sample per tick.
    Unconditional,
    /// Drop samples closer than 0.9 tick intervals to the last accepted one.
    #[default]
    MinSpacing,
}

/// Time series of angles for one tracking run.
#[derive(Debug, Clone)]
pub struct SessionBuffer {
    samples: Vec<AngleSample>,
    policy: AdmissionPolicy,
    tick_interval: Duration,
}

impl SessionBuffer {
    pub fn new(policy: AdmissionPolicy, tick_interval: Duration) -> Self {
        Self {
            samples: Vec::new(),
            policy,
            tick_interval,
        }
    }

    /// Append a point if the admission policy allows it.
    ///
    /// Points earlier than the last accepted one are always refused.
    pub fn append(&mut self, angle_x: f64, angle_y: f64, time_secs: f64) -> bool {
        if let Some(last) = self.samples.last() {
            let gap = time_secs - last.time_secs;
            if gap < 0.0 {
                return false;
            }
            if self.policy == AdmissionPolicy::MinSpacing
                && gap < MIN_SPACING_FRACTION * self.tick_interval.as_secs_f64()
            {
                return false;
            }
        }

        self.samples.push(AngleSample {
            time_secs,
            angle_x,
            angle_y,
        });
        true
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }

    pub fn snapshot(&self) -> Vec<AngleSample> {
        self.samples.clone()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last(&self) -> Option<&AngleSample> {
        self.samples.last()
    }

    /// Time covered from the first to the last sample, in seconds.
    pub fn duration(&self) -> f64 {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => last.time_secs - first.time_secs,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(20);

    #[test]
    fn unconditional_accepts_every_tick() {
        let mut buffer = SessionBuffer::new(AdmissionPolicy::Unconditional, TICK);
        assert!(buffer.append(1.0, 2.0, 0.0));
        assert!(buffer.append(1.0, 2.0, 0.001));
        assert!(buffer.append(1.0, 2.0, 0.001));
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn min_spacing_drops_near_duplicates() {
        let mut buffer = SessionBuffer::new(AdmissionPolicy::MinSpacing, TICK);
        assert!(buffer.append(0.0, 0.0, 0.0));
        // 0.9 * 20 ms = 18 ms.
        assert!(!buffer.append(0.0, 0.0, 0.017));
        assert!(buffer.append(0.0, 0.0, 0.0185));
        assert!(!buffer.append(0.0, 0.0, 0.030));
        assert!(buffer.append(0.0, 0.0, 0.040));
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn out_of_order_points_are_refused() {
        let mut buffer = SessionBuffer::new(AdmissionPolicy::Unconditional, TICK);
        buffer.append(0.0, 0.0, 1.0);
        assert!(!buffer.append(0.0, 0.0, 0.5));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn timestamps_never_decrease() {
        let mut buffer = SessionBuffer::new(AdmissionPolicy::MinSpacing, TICK);
        let times = [0.0, 0.02, 0.01, 0.05, 0.05, 0.04, 0.08, 0.1];
        for t in times {
            buffer.append(0.0, 0.0, t);
        }
        let snapshot = buffer.snapshot();
        assert!(snapshot.windows(2).all(|w| w[0].time_secs <= w[1].time_secs));
    }

    #[test]
    fn reset_empties_snapshot() {
        let mut buffer = SessionBuffer::new(AdmissionPolicy::Unconditional, TICK);
        buffer.append(3.0, 4.0, 0.0);
        buffer.append(3.0, 4.0, 0.02);
        assert!((buffer.duration() - 0.02).abs() < 1e-12);

        buffer.reset();
        assert!(buffer.snapshot().is_empty());
        assert!(buffer.is_empty());
        assert_eq!(buffer.duration(), 0.0);
    }

    #[test]
    fn snapshot_is_detached() {
        let mut buffer = SessionBuffer::new(AdmissionPolicy::Unconditional, TICK);
        buffer.append(1.0, 1.0, 0.0);
        let snapshot = buffer.snapshot();
        buffer.reset();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].angle_x, 1.0);
    }
}
