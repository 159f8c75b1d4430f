//! Delayed re-verification of push factors.
//!
//! At most one timer is pending. Invalidation aborts the timer task and bumps
//! the generation, so a timer that already fired and queued its event is
//! recognised as stale when the event is processed.

use std::time::Duration;
use tokio::{task::JoinHandle, time::sleep};
use tracing::debug;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug)]
struct PendingPoll {
    generation: u64,
    task: JoinHandle<()>,
}

#[derive(Debug)]
pub(crate) struct PollScheduler {
    interval: Duration,
    generation: u64,
    pending: Option<PendingPoll>,
}

impl PollScheduler {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            generation: 0,
            pending: None,
        }
    }

    pub(crate) fn interval(&self) -> Duration {
        self.interval
    }

    /// Replace any pending poll with a new one; `fire` runs once `interval`
    /// has elapsed and receives the generation to hand back to [`Self::take_due`].
    pub(crate) fn schedule<F>(&mut self, fire: F) -> u64
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.invalidate();
        self.generation += 1;
        let generation = self.generation;
        let interval = self.interval;

        let task = tokio::spawn(async move {
            sleep(interval).await;
            fire(generation);
        });

        debug!(generation, ?interval, "poll scheduled");
        self.pending = Some(PendingPoll { generation, task });
        generation
    }

    /// Drop the pending poll, if any. Returns whether one was pending.
    pub(crate) fn invalidate(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                pending.task.abort();
                debug!(generation = pending.generation, "poll invalidated");
                true
            }
            None => false,
        }
    }

    /// Accept a fired timer only if it is still the pending one.
    pub(crate) fn take_due(&mut self, generation: u64) -> bool {
        match &self.pending {
            Some(pending) if pending.generation == generation => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.invalidate();
    }
}
