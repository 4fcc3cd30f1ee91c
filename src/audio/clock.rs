use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic millisecond time source shared by the analyzer and the mapper.
pub trait Clock {
    fn now_ms(&self) -> f64;
}

/// Wall-clock time measured from the moment the clock was created.
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
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Hand-driven clock. Clones share the same reading, so a driver can keep one
/// handle and give another to the component under its control.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, step: Duration) {
        self.micros
            .fetch_add(step.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn advance_ms(&self, ms: f64) {
        self.micros
            .fetch_add((ms.max(0.0) * 1000.0).round() as u64, Ordering::Relaxed);
    }

    pub fn set_ms(&self, ms: f64) {
        self.micros
            .store((ms.max(0.0) * 1000.0).round() as u64, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.micros.load(Ordering::Relaxed) as f64 / 1000.0
    }
}
