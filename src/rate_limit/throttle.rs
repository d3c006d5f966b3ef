//! Throttle: at most one invocation per window.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::ThrottleConfig;
use crate::rate_limit::timer::Timer;
use crate::time::deadline_after;

/// Which edges of a window invoke the function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleOptions {
    /// Invoke immediately when no window is open.
    pub leading: bool,
    /// Invoke at the end of a window with the most recent arguments.
    pub trailing: bool,
}

impl Default for ThrottleOptions {
    fn default() -> Self {
        Self {
            leading: true,
            trailing: true,
        }
    }
}

impl From<&ThrottleConfig> for ThrottleOptions {
    fn from(config: &ThrottleConfig) -> Self {
        Self {
            leading: config.leading,
            trailing: config.trailing,
        }
    }
}

struct State<A> {
    /// Start of the current window: the last invocation, or the first
    /// deferred call when the leading edge is disabled.
    window_start: Option<Instant>,
    pending: Option<A>,
    timer: Timer,
}

struct Inner<A> {
    func: Box<dyn Fn(A) + Send + Sync>,
    limit: Duration,
    options: ThrottleOptions,
    state: Mutex<State<A>>,
}

/// Handle to a throttled function. Clones share the same state.
pub struct Throttled<A> {
    inner: Arc<Inner<A>>,
}

/// Wrap `func` so it runs at most once per `limit`.
pub fn throttle<A, F>(func: F, limit: Duration, options: ThrottleOptions) -> Throttled<A>
where
    A: Send + 'static,
    F: Fn(A) + Send + Sync + 'static,
{
    Throttled {
        inner: Arc::new(Inner {
            func: Box::new(func),
            limit,
            options,
            state: Mutex::new(State {
                window_start: None,
                pending: None,
                timer: Timer::default(),
            }),
        }),
    }
}

impl<A: Send + 'static> Throttled<A> {
    pub fn call(&self, args: A) {
        let now = Instant::now();
        let options = self.inner.options;

        let immediate = {
            let mut state = self.inner.lock();
            let window_open = state.timer.is_armed()
                || state
                    .window_start
                    .is_some_and(|start| now < deadline_after(start, self.inner.limit));

            if !window_open {
                state.window_start = Some(now);
                if options.leading {
                    state.pending = None;
                    Some(args)
                } else {
                    if options.trailing {
                        state.pending = Some(args);
                        self.arm(&mut state, deadline_after(now, self.inner.limit));
                    }
                    None
                }
            } else {
                if options.trailing {
                    state.pending = Some(args);
                    if !state.timer.is_armed() {
                        let start = state.window_start.unwrap_or(now);
                        self.arm(&mut state, deadline_after(start, self.inner.limit));
                    }
                }
                None
            }
        };

        if let Some(args) = immediate {
            (self.inner.func)(args);
        }
    }

    /// Drop any deferred call and close the current window.
    pub fn cancel(&self) {
        let mut state = self.inner.lock();
        state.timer.cancel();
        state.pending = None;
        state.window_start = None;
    }

    /// Whether a trailing invocation is scheduled.
    pub fn is_pending(&self) -> bool {
        self.inner.lock().pending.is_some()
    }

    fn arm(&self, state: &mut State<A>, deadline: Instant) {
        let inner = Arc::clone(&self.inner);
        state
            .timer
            .arm_at(deadline, move |generation| inner.fire(generation));
    }
}

impl<A> Inner<A> {
    fn lock(&self) -> MutexGuard<'_, State<A>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fire(&self, generation: u64) {
        let pending = {
            let mut state = self.lock();
            if !state.timer.claim(generation) {
                return;
            }
            let pending = state.pending.take();
            if pending.is_some() {
                state.window_start = Some(Instant::now());
            }
            pending
        };
        if let Some(args) = pending {
            tracing::trace!(
                limit_ms = self.limit.as_millis() as u64,
                "Throttled trailing call fired"
            );
            (self.func)(args);
        }
    }
}

impl<A> Clone for Throttled<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> fmt::Debug for Throttled<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throttled")
            .field("limit", &self.inner.limit)
            .field("options", &self.inner.options)
            .finish()
    }
}
