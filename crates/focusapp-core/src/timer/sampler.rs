//! Periodic elapsed-time sampling for display.
//!
//! The sampler only reads the controller. It never records durations, so a
//! late or skipped tick cannot make persisted data drift.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use super::controller::{SessionController, TimerSnapshot};

/// Shortest period the sampler ticks at.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

pub struct ElapsedSampler {
    rx: watch::Receiver<TimerSnapshot>,
    handle: JoinHandle<()>,
}

impl ElapsedSampler {
    /// Start sampling `controller` every `period`.
    ///
    /// Must be called from inside a tokio runtime. The task exits on its
    /// own once the controller leaves the active states, after publishing
    /// a final snapshot. Periods shorter than [`MIN_PERIOD`] are raised to it.
    pub fn spawn(controller: Arc<SessionController>, period: Duration) -> Self {
        if period < MIN_PERIOD {
            tracing::warn!(?period, min = ?MIN_PERIOD, "sampler period too short, clamping");
        }
        let period = period.max(MIN_PERIOD);
        let (tx, rx) = watch::channel(controller.snapshot());
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick of `interval` completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let snapshot = controller.snapshot();
                let active = snapshot.state.is_active();
                if tx.send(snapshot).is_err() {
                    tracing::debug!("sampler has no subscribers left");
                    break;
                }
                if !active {
                    tracing::debug!("session no longer active, sampler stopping");
                    break;
                }
            }
        });
        Self { rx, handle }
    }

    pub fn subscribe(&self) -> watch::Receiver<TimerSnapshot> {
        self.rx.clone()
    }

    pub fn latest(&self) -> TimerSnapshot {
        self.rx.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for ElapsedSampler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
