//! Time-driven checkpoint cadence.

use std::time::{Duration, Instant};

/// Decides when a client is due for its next checkpoint insertion
#[derive(Debug, Clone)]
pub struct CheckpointTimer {
    interval: Duration,
    last: Instant,
}

impl CheckpointTimer {
    /// Timer whose first checkpoint falls one `interval` after `now`
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self { interval, last: now }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last) >= self.interval
    }

    pub fn reset(&mut self, now: Instant) {
        self.last = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_after_interval() {
        let start = Instant::now();
        let mut timer = CheckpointTimer::new(Duration::from_millis(50), start);
        assert!(!timer.is_due(start + Duration::from_millis(49)));
        assert!(timer.is_due(start + Duration::from_millis(50)));

        timer.reset(start + Duration::from_millis(60));
        assert!(!timer.is_due(start + Duration::from_millis(100)));
        assert!(timer.is_due(start + Duration::from_millis(110)));
    }
}
