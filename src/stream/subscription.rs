//! Subscription handles and teardown bookkeeping.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub(crate) type Teardown = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct TeardownList {
    closed: bool,
    teardowns: Vec<Teardown>,
}

/// Closed flag plus the teardowns to run when it flips.
#[derive(Default)]
pub(crate) struct SubscriptionState {
    inner: Mutex<TeardownList>,
}

impl SubscriptionState {
    fn lock(&self) -> MutexGuard<'_, TeardownList> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Mark closed. Returns the pending teardowns on the first call only.
    pub(crate) fn close(&self) -> Option<Vec<Teardown>> {
        let mut list = self.lock();
        if list.closed {
            return None;
        }
        list.closed = true;
        Some(std::mem::take(&mut list.teardowns))
    }

    /// Register a teardown. Runs it immediately if already closed.
    pub(crate) fn add(&self, teardown: Teardown) {
        let run_now = {
            let mut list = self.lock();
            if list.closed {
                Some(teardown)
            } else {
                list.teardowns.push(teardown);
                None
            }
        };
        if let Some(teardown) = run_now {
            teardown();
        }
    }
}

pub(crate) fn run_all(teardowns: Vec<Teardown>) {
    for teardown in teardowns {
        teardown();
    }
}

/// Handle returned by `subscribe`. Clones refer to the same subscription.
#[derive(Clone)]
pub struct Subscription {
    state: Arc<SubscriptionState>,
}

impl Subscription {
    pub(crate) fn from_state(state: Arc<SubscriptionState>) -> Self {
        Self { state }
    }

    /// Stop delivery and release upstream resources. Idempotent.
    pub fn unsubscribe(&self) {
        if let Some(teardowns) = self.state.close() {
            run_all(teardowns);
        }
    }

    /// True after `unsubscribe` or after the stream terminated.
    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// Run `teardown` when this subscription ends.
    pub fn add(&self, teardown: impl FnOnce() + Send + 'static) {
        self.state.add(Box::new(teardown));
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}
