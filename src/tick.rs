use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::time::{self, Interval, MissedTickBehavior};

/// Stops a [`TickLoop`] from any task. Cancelling twice is harmless.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            debug!("Tick loop cancelled");
            self.notify.notify_one();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Fixed-rate frame clock for the render side.
///
/// Ticks that fall behind are skipped rather than bunched up, so a slow frame
/// never causes a burst of catch-up ticks.
pub struct TickLoop {
    interval: Interval,
    period: Duration,
    cancel: CancelHandle,
}

impl TickLoop {
    pub fn new(fps: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            interval,
            period,
            cancel: CancelHandle::new(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Wait for the next frame. `None` once the loop has been cancelled.
    pub async fn next_tick(&mut self) -> Option<Instant> {
        if self.cancel.is_cancelled() {
            return None;
        }

        tokio::select! {
            instant = self.interval.tick() => {
                if self.cancel.is_cancelled() {
                    None
                } else {
                    Some(instant.into_std())
                }
            }
            _ = self.cancel.notify.notified() => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ticks_follow_the_frame_period() {
        let mut ticks = TickLoop::new(200);
        assert_eq!(ticks.period(), Duration::from_millis(5));

        let first = ticks.next_tick().await.unwrap();
        let second = ticks.next_tick().await.unwrap();
        let third = ticks.next_tick().await.unwrap();
        assert!(second > first);
        assert!(third > second);
    }

    #[tokio::test]
    async fn cancelled_loop_yields_none() {
        let mut ticks = TickLoop::new(60);
        let handle = ticks.cancel_handle();

        handle.cancel();
        handle.cancel();
        assert!(handle.is_cancelled());
        assert!(ticks.next_tick().await.is_none());
        assert!(ticks.next_tick().await.is_none());
    }

    #[tokio::test]
    async fn cancel_wakes_a_waiting_tick() {
        let mut ticks = TickLoop::new(1);
        // The first tick of an interval completes immediately
        assert!(ticks.next_tick().await.is_some());

        let handle = ticks.cancel_handle();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(10)).await;
            handle.cancel();
        });

        let result = time::timeout(Duration::from_millis(500), ticks.next_tick()).await;
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn zero_fps_is_treated_as_one() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let ticks = runtime.block_on(async { TickLoop::new(0) });
        assert_eq!(ticks.period(), Duration::from_secs(1));
    }
}
