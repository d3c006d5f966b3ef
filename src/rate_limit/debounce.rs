//! Debounce: collapse a burst of calls into one invocation.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::DebounceConfig;
use crate::rate_limit::timer::Timer;
use crate::time::deadline_after;

/// Which edges of a burst invoke the function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceOptions {
    /// Invoke on the first call of a burst.
    pub leading: bool,
    /// Invoke `delay` after the last call of a burst, with its arguments.
    pub trailing: bool,
}

impl Default for DebounceOptions {
    fn default() -> Self {
        Self {
            leading: false,
            trailing: true,
        }
    }
}

impl From<&DebounceConfig> for DebounceOptions {
    fn from(config: &DebounceConfig) -> Self {
        Self {
            leading: config.leading,
            trailing: config.trailing,
        }
    }
}

struct State<A> {
    pending: Option<A>,
    timer: Timer,
}

struct Inner<A> {
    func: Box<dyn Fn(A) + Send + Sync>,
    delay: Duration,
    options: DebounceOptions,
    state: Mutex<State<A>>,
}

/// Handle to a debounced function. Clones share the same state.
pub struct Debounced<A> {
    inner: Arc<Inner<A>>,
}

/// Wrap `func` so a burst of calls spaced less than `delay` apart invokes it
/// at most once per enabled edge.
pub fn debounce<A, F>(func: F, delay: Duration, options: DebounceOptions) -> Debounced<A>
where
    A: Send + 'static,
    F: Fn(A) + Send + Sync + 'static,
{
    Debounced {
        inner: Arc::new(Inner {
            func: Box::new(func),
            delay,
            options,
            state: Mutex::new(State {
                pending: None,
                timer: Timer::default(),
            }),
        }),
    }
}

impl<A: Send + 'static> Debounced<A> {
    pub fn call(&self, args: A) {
        let leading = {
            let mut state = self.inner.lock();
            let burst_start = !state.timer.is_armed();

            let leading = if burst_start && self.inner.options.leading {
                state.pending = None;
                Some(args)
            } else {
                if self.inner.options.trailing {
                    state.pending = Some(args);
                }
                None
            };

            let inner = Arc::clone(&self.inner);
            let deadline = deadline_after(Instant::now(), self.inner.delay);
            state
                .timer
                .arm_at(deadline, move |generation| inner.fire(generation));
            leading
        };

        if let Some(args) = leading {
            (self.inner.func)(args);
        }
    }

    /// Drop the pending invocation and end the burst.
    pub fn cancel(&self) {
        let mut state = self.inner.lock();
        state.timer.cancel();
        state.pending = None;
    }

    /// Invoke the pending trailing call now. Returns whether anything ran.
    pub fn flush(&self) -> bool {
        let pending = {
            let mut state = self.inner.lock();
            state.timer.cancel();
            state.pending.take()
        };
        match pending {
            Some(args) => {
                (self.inner.func)(args);
                true
            }
            None => false,
        }
    }

    /// Whether a trailing invocation is scheduled.
    pub fn is_pending(&self) -> bool {
        self.inner.lock().pending.is_some()
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
            state.pending.take()
        };
        if let Some(args) = pending {
            tracing::trace!(delay_ms = self.delay.as_millis() as u64, "Debounced call fired");
            (self.func)(args);
        }
    }
}

impl<A> Clone for Debounced<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> fmt::Debug for Debounced<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debounced")
            .field("delay", &self.inner.delay)
            .field("options", &self.inner.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Calls = Arc<Mutex<Vec<(u32, Duration)>>>;

    fn recorder(start: Instant) -> (Calls, impl Fn(u32) + Send + Sync + 'static) {
        let calls: Calls = Arc::default();
        let sink = calls.clone();
        (calls, move |n| sink.lock().unwrap().push((n, start.elapsed())))
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_invokes_once_with_last_args() {
        let start = Instant::now();
        let (calls, func) = recorder(start);
        let debounced = debounce(func, ms(100), DebounceOptions::default());

        for n in 1..=5 {
            debounced.call(n);
            tokio::time::sleep(ms(50)).await;
        }
        assert!(calls.lock().unwrap().is_empty());

        tokio::time::sleep(ms(100)).await;
        // Last call at 200ms, quiet period ends at 300ms
        assert_eq!(*calls.lock().unwrap(), vec![(5, ms(300))]);
        assert!(!debounced.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn leading_edge_fires_immediately() {
        let start = Instant::now();
        let (calls, func) = recorder(start);
        let debounced = debounce(
            func,
            ms(100),
            DebounceOptions {
                leading: true,
                trailing: false,
            },
        );

        debounced.call(1);
        debounced.call(2);
        assert_eq!(*calls.lock().unwrap(), vec![(1, ms(0))]);

        tokio::time::sleep(ms(150)).await;
        debounced.call(3);
        assert_eq!(calls.lock().unwrap().len(), 2);
        assert_eq!(calls.lock().unwrap()[1], (3, ms(150)));
    }

    #[tokio::test(start_paused = true)]
    async fn leading_and_trailing_single_call_fires_once() {
        let (calls, func) = recorder(Instant::now());
        let debounced = debounce(
            func,
            ms(100),
            DebounceOptions {
                leading: true,
                trailing: true,
            },
        );

        debounced.call(1);
        tokio::time::sleep(ms(200)).await;
        assert_eq!(calls.lock().unwrap().len(), 1);

        debounced.call(2);
        debounced.call(3);
        tokio::time::sleep(ms(200)).await;
        let seen: Vec<u32> = calls.lock().unwrap().iter().map(|(n, _)| *n).collect();
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_trailing_call() {
        let (calls, func) = recorder(Instant::now());
        let debounced = debounce(func, ms(100), DebounceOptions::default());

        debounced.call(1);
        assert!(debounced.is_pending());
        debounced.cancel();
        assert!(!debounced.is_pending());

        tokio::time::sleep(ms(500)).await;
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn flush_runs_pending_call_now() {
        let (calls, func) = recorder(Instant::now());
        let debounced = debounce(func, ms(100), DebounceOptions::default());

        assert!(!debounced.flush());
        debounced.call(7);
        assert!(debounced.flush());
        assert_eq!(*calls.lock().unwrap(), vec![(7, ms(0))]);

        tokio::time::sleep(ms(500)).await;
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_delay_waits_for_flush() {
        let (calls, func) = recorder(Instant::now());
        let debounced = debounce(func, Duration::MAX, DebounceOptions::default());

        debounced.call(1);
        debounced.call(2);
        tokio::time::sleep(Duration::from_secs(86_400)).await;
        assert!(debounced.is_pending());
        assert!(calls.lock().unwrap().is_empty());

        assert!(debounced.flush());
        assert_eq!(calls.lock().unwrap()[0].0, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn both_edges_disabled_never_invokes() {
        let (calls, func) = recorder(Instant::now());
        let debounced = debounce(
            func,
            ms(10),
            DebounceOptions {
                leading: false,
                trailing: false,
            },
        );

        debounced.call(1);
        debounced.call(2);
        tokio::time::sleep(ms(100)).await;
        assert!(calls.lock().unwrap().is_empty());
    }
}
