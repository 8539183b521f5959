//! Periodic full flush.

use crate::bus::InvalidationBus;
use crate::event::InvalidationEvent;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

/// Default time between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Background timer publishing a `clean` event every `every`, regardless of
/// mutation activity.
///
/// Bounds how long any entry can outlive its true validity, whether an
/// event was lost or a mutation bypassed the builder entirely. The task is
/// aborted when the `Sweeper` is dropped.
///
/// A zero interval cannot tick, so [`spawn`](Self::spawn) refuses it.
#[derive(Debug)]
pub struct Sweeper {
    every: Duration,
    task: JoinHandle<()>,
}
impl Sweeper {
    /// Returns `None`, spawning nothing, when `every` is zero.
    pub fn spawn(runtime: &Handle, bus: InvalidationBus, every: Duration) -> Option<Self> {
        if every.is_zero() {
            tracing::warn!("Refusing to start a sweeper with a zero interval");
            return None;
        }
        let task = runtime.spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; nothing to sweep yet.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                tracing::debug!(every = ?every, "Sweeping query cache");
                if !bus.publish(InvalidationEvent::clean()) {
                    break;
                }
            }
        });
        Some(Self { every, task })
    }

    pub fn interval(&self) -> Duration {
        self.every
    }

    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_stopped(&self) -> bool {
        self.task.is_finished()
    }
}
impl Drop for Sweeper {
    fn drop(&mut self) {
        self.task.abort();
    }
}
