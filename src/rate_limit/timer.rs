//! Cancellable one-shot timer.

use tokio::task::JoinHandle;
use tokio::time::Instant;

/// At most one armed tokio task, tagged with a generation.
#[derive(Debug, Default)]
pub(crate) struct Timer {
    handle: Option<JoinHandle<()>>,
    generation: u64,
}

impl Timer {
    pub(crate) fn is_armed(&self) -> bool {
        self.handle.is_some()
    }

    /// Abort the armed task, if any, and invalidate its generation.
    pub(crate) fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.generation += 1;
    }

    /// Replace any armed task with one that calls `fire(generation)` at `deadline`.
    pub(crate) fn arm_at<F>(&mut self, deadline: Instant, fire: F)
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.cancel();
        let generation = self.generation;
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            fire(generation);
        }));
    }

    /// Called by a firing task with its lock held. Returns false if the task
    /// was superseded or cancelled after it woke up.
    pub(crate) fn claim(&mut self, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        self.handle = None;
        true
    }
}
