//! Operators: each returns a new observable that subscribes upstream once
//! per downstream subscriber and unsubscribes upstream when that subscriber
//! ends.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::StreamError;
use crate::rate_limit::timer::Timer;
use crate::stream::observable::Observable;
use crate::stream::observer::{Observer, Subscriber};
use crate::time::deadline_after;

type OnNext<T, U> = Box<dyn FnMut(T, &Subscriber<U>) + Send>;
type OnError<U> = Box<dyn FnMut(StreamError, &Subscriber<U>) + Send>;
type OnComplete<U> = Box<dyn FnMut(&Subscriber<U>) + Send>;

/// Upstream observer that forwards into a downstream subscriber.
///
/// Errors and completion pass straight through unless overridden.
pub(crate) struct Relay<T, U> {
    downstream: Subscriber<U>,
    on_next: OnNext<T, U>,
    on_error: OnError<U>,
    on_complete: OnComplete<U>,
}

impl<T: Send + 'static, U: Send + 'static> Relay<T, U> {
    pub(crate) fn new(
        downstream: Subscriber<U>,
        on_next: impl FnMut(T, &Subscriber<U>) + Send + 'static,
    ) -> Self {
        Self {
            downstream,
            on_next: Box::new(on_next),
            on_error: Box::new(|err: StreamError, out: &Subscriber<U>| out.error(err)),
            on_complete: Box::new(|out: &Subscriber<U>| out.complete()),
        }
    }

    pub(crate) fn on_error(
        mut self,
        f: impl FnMut(StreamError, &Subscriber<U>) + Send + 'static,
    ) -> Self {
        self.on_error = Box::new(f);
        self
    }

    pub(crate) fn on_complete(mut self, f: impl FnMut(&Subscriber<U>) + Send + 'static) -> Self {
        self.on_complete = Box::new(f);
        self
    }

    /// Subscribe to `source`, tying the upstream subscription's lifetime to
    /// `downstream`. The link is made before the source starts emitting, so
    /// a synchronous source sees the downstream close as it happens.
    pub(crate) fn attach(self, source: &Observable<T>, downstream: &Subscriber<U>) {
        let upstream = Subscriber::new(self);
        let link = upstream.subscription();
        downstream.add_teardown(move || link.unsubscribe());
        source.subscribe_with(upstream);
    }
}

impl<T: Send, U: Send + 'static> Observer<T> for Relay<T, U> {
    fn next(&mut self, value: T) {
        (self.on_next)(value, &self.downstream)
    }

    fn error(&mut self, err: StreamError) {
        (self.on_error)(err, &self.downstream)
    }

    fn complete(&mut self) {
        (self.on_complete)(&self.downstream)
    }
}

impl<T: Send + 'static> Observable<T> {
    pub fn map<U, F>(&self, f: F) -> Observable<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let source = self.clone();
        let f = Arc::new(f);
        Observable::new(move |downstream| {
            let f = Arc::clone(&f);
            Relay::new(downstream.clone(), move |value, out| out.next(f(value)))
                .attach(&source, &downstream);
        })
    }

    pub fn filter<P>(&self, predicate: P) -> Observable<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let source = self.clone();
        let predicate = Arc::new(predicate);
        Observable::new(move |downstream| {
            let predicate = Arc::clone(&predicate);
            Relay::new(downstream.clone(), move |value, out| {
                if predicate(&value) {
                    out.next(value);
                }
            })
            .attach(&source, &downstream);
        })
    }

    /// Emit the running accumulation, starting from `seed` for each subscriber.
    pub fn scan<U, F>(&self, seed: U, f: F) -> Observable<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(U, T) -> U + Send + Sync + 'static,
    {
        let source = self.clone();
        let f = Arc::new(f);
        Observable::new(move |downstream| {
            let f = Arc::clone(&f);
            let mut acc = Some(seed.clone());
            Relay::new(downstream.clone(), move |value, out| {
                if let Some(prev) = acc.take() {
                    let next = f(prev, value);
                    acc = Some(next.clone());
                    out.next(next);
                }
            })
            .attach(&source, &downstream);
        })
    }

    /// Emit the first `count` values, then complete and unsubscribe upstream.
    pub fn take(&self, count: usize) -> Observable<T> {
        if count == 0 {
            return Observable::empty();
        }
        let source = self.clone();
        Observable::new(move |downstream| {
            let mut seen = 0;
            Relay::new(downstream.clone(), move |value, out| {
                if seen >= count {
                    return;
                }
                seen += 1;
                out.next(value);
                if seen == count {
                    out.complete();
                }
            })
            .attach(&source, &downstream);
        })
    }

    /// Drop values equal to the previous emitted value.
    pub fn distinct_until_changed(&self) -> Observable<T>
    where
        T: PartialEq + Clone,
    {
        let source = self.clone();
        Observable::new(move |downstream| {
            let mut last: Option<T> = None;
            Relay::new(downstream.clone(), move |value, out| {
                if last.as_ref() == Some(&value) {
                    return;
                }
                last = Some(value.clone());
                out.next(value);
            })
            .attach(&source, &downstream);
        })
    }

    /// Emit a value only after `quiet` has passed without another one.
    ///
    /// A pending value is emitted before completion; an error drops it.
    /// Must be subscribed within a tokio runtime.
    pub fn debounce_time(&self, quiet: Duration) -> Observable<T> {
        let source = self.clone();
        Observable::new(move |downstream| {
            let gate = Arc::new(DebounceGate::<T>::default());
            {
                let gate = Arc::clone(&gate);
                downstream.add_teardown(move || gate.cancel());
            }

            let on_next = Arc::clone(&gate);
            let on_error = Arc::clone(&gate);
            let on_complete = gate;
            Relay::new(downstream.clone(), move |value, out| {
                on_next.hold(value, deadline_after(Instant::now(), quiet), out.clone());
            })
            .on_error(move |err, out| {
                on_error.cancel();
                out.error(err);
            })
            .on_complete(move |out| {
                if let Some(value) = on_complete.take_pending() {
                    out.next(value);
                }
                out.complete();
            })
            .attach(&source, &downstream);
        })
    }
}

struct GateState<T> {
    pending: Option<T>,
    timer: Timer,
}

/// Per-subscriber state of `debounce_time`.
struct DebounceGate<T> {
    state: Mutex<GateState<T>>,
}

impl<T> Default for DebounceGate<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(GateState {
                pending: None,
                timer: Timer::default(),
            }),
        }
    }
}

impl<T: Send + 'static> DebounceGate<T> {
    fn lock(&self) -> MutexGuard<'_, GateState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn hold(self: &Arc<Self>, value: T, deadline: Instant, out: Subscriber<T>) {
        let gate = Arc::clone(self);
        let mut state = self.lock();
        state.pending = Some(value);
        state.timer.arm_at(deadline, move |generation| {
            let ready = {
                let mut state = gate.lock();
                if !state.timer.claim(generation) {
                    return;
                }
                state.pending.take()
            };
            if let Some(value) = ready {
                out.next(value);
            }
        });
    }

    fn take_pending(&self) -> Option<T> {
        let mut state = self.lock();
        state.timer.cancel();
        state.pending.take()
    }

    fn cancel(&self) {
        let mut state = self.lock();
        state.timer.cancel();
        state.pending = None;
    }
}
