//! Simulation time source
//!
//! The host scheduler owns time. Generators, engines and the evaluator read
//! it through a shared [`Clock`] so they can be driven by tests without a
//! running scheduler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Read-only view of the simulation clock
pub trait Clock: Send + Sync {
    /// Simulation time elapsed since start
    fn now(&self) -> Duration;
}

pub type SharedClock = Arc<dyn Clock>;

/// Clock advanced explicitly by the host
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<ManualClock> {
        Arc::new(Self::new())
    }

    pub fn set(&self, now: Duration) {
        self.nanos.store(now.as_nanos() as u64, Ordering::Release);
    }

    pub fn advance(&self, delta: Duration) {
        self.nanos
            .fetch_add(delta.as_nanos() as u64, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_starts_at_zero() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), Duration::ZERO);
    }

    #[test]
    fn test_manual_clock_set_and_advance() {
        let clock = ManualClock::new();
        clock.set(Duration::from_millis(3));
        clock.advance(Duration::from_micros(500));
        assert_eq!(clock.now(), Duration::from_micros(3500));
    }

    #[test]
    fn test_shared_clock_sees_updates() {
        let clock = ManualClock::shared();
        let shared: SharedClock = clock.clone();
        clock.set(Duration::from_secs(2));
        assert_eq!(shared.now(), Duration::from_secs(2));
    }
}
