//! Cold observables and their constructors.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::StreamError;
use crate::stream::observer::{Observer, Subscriber};
use crate::stream::operators::Relay;
use crate::stream::subscription::Subscription;
use crate::time::{deadline_after, FAR_FUTURE};

type SubscribeFn<T> = dyn Fn(Subscriber<T>) + Send + Sync;

/// A recipe for producing values, run once per subscriber.
pub struct Observable<T> {
    on_subscribe: Arc<SubscribeFn<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            on_subscribe: Arc::clone(&self.on_subscribe),
        }
    }
}

impl<T> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable").finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Observable<T> {
    /// Build an observable from a producer.
    ///
    /// The producer runs on every `subscribe`. It should stop emitting once
    /// `subscriber.is_closed()` and register cleanup with `add_teardown`.
    pub fn new(on_subscribe: impl Fn(Subscriber<T>) + Send + Sync + 'static) -> Self {
        Self {
            on_subscribe: Arc::new(on_subscribe),
        }
    }

    pub fn subscribe(&self, observer: impl Observer<T> + 'static) -> Subscription {
        let subscriber = Subscriber::new(observer);
        let subscription = subscriber.subscription();
        self.subscribe_with(subscriber);
        subscription
    }

    /// Run the producer for an existing subscriber.
    pub(crate) fn subscribe_with(&self, subscriber: Subscriber<T>) {
        (self.on_subscribe)(subscriber);
    }

    /// Completes immediately without emitting.
    pub fn empty() -> Self {
        Self::new(|subscriber| subscriber.complete())
    }

    /// Errors immediately without emitting.
    pub fn fail(err: StreamError) -> Self {
        Self::new(move |subscriber| subscriber.error(err.clone()))
    }

    /// Emit each value synchronously, then complete.
    pub fn of(values: impl IntoIterator<Item = T>) -> Self
    where
        T: Clone + Sync,
    {
        let values: Vec<T> = values.into_iter().collect();
        Self::from_iter(values)
    }

    /// Emit every item of a fresh copy of `iterable`, then complete.
    pub fn from_iter<I>(iterable: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
    {
        Self::new(move |subscriber| {
            for value in iterable.clone() {
                if subscriber.is_closed() {
                    return;
                }
                subscriber.next(value);
            }
            subscriber.complete();
        })
    }

    /// Run `factory()` per subscriber on a tokio task; emit its value and
    /// complete, or error. Unsubscribing aborts the task.
    pub fn from_future<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, StreamError>> + Send + 'static,
    {
        Self::new(move |subscriber| {
            let future = factory();
            let emitter = subscriber.clone();
            let task = tokio::spawn(async move {
                match future.await {
                    Ok(value) => {
                        emitter.next(value);
                        emitter.complete();
                    }
                    Err(err) => emitter.error(err),
                }
            });
            subscriber.add_teardown(move || task.abort());
        })
    }

    /// Emit values from every source; complete when all have completed.
    ///
    /// The first error from any source errors the result and unsubscribes
    /// the remaining sources.
    pub fn merge(sources: impl IntoIterator<Item = Observable<T>>) -> Self {
        let sources: Vec<Observable<T>> = sources.into_iter().collect();
        Self::new(move |downstream| {
            if sources.is_empty() {
                downstream.complete();
                return;
            }

            let remaining = Arc::new(AtomicUsize::new(sources.len()));
            for source in &sources {
                if downstream.is_closed() {
                    return;
                }
                let remaining = Arc::clone(&remaining);
                let relay = Relay::new(downstream.clone(), |value, out| out.next(value))
                    .on_complete(move |out| {
                        if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                            out.complete();
                        }
                    });
                relay.attach(source, &downstream);
            }
        })
    }
}

impl Observable<u64> {
    /// Emit 0, 1, 2, ... every `period`, starting one period after subscribe.
    ///
    /// Each subscriber gets its own tokio task; unsubscribing aborts it.
    /// A zero period is treated as one millisecond; very long periods are
    /// capped so the first deadline stays representable.
    pub fn interval(period: Duration) -> Self {
        let period = period.clamp(Duration::from_millis(1), FAR_FUTURE);
        Self::new(move |subscriber| {
            let emitter = subscriber.clone();
            let task = tokio::spawn(async move {
                let start = deadline_after(Instant::now(), period);
                let mut ticks = tokio::time::interval_at(start, period);
                ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
                for n in 0u64.. {
                    ticks.tick().await;
                    if emitter.is_closed() {
                        break;
                    }
                    emitter.next(n);
                }
            });
            subscriber.add_teardown(move || task.abort());
        })
    }
}
