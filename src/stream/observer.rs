//! Observers and the subscriber wrapper that feeds them.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::StreamError;
use crate::stream::subscription::{run_all, Subscription, SubscriptionState};

/// Receiver of stream notifications.
///
/// After `error` or `complete` no further calls are made.
pub trait Observer<T>: Send {
    fn next(&mut self, value: T);

    fn error(&mut self, err: StreamError) {
        let _ = err;
    }

    fn complete(&mut self) {}
}

/// Any `FnMut(T)` observes values and ignores termination.
impl<T, F> Observer<T> for F
where
    F: FnMut(T) + Send,
{
    fn next(&mut self, value: T) {
        self(value)
    }
}

/// Observer assembled from closures.
pub struct CallbackObserver<T> {
    on_next: Box<dyn FnMut(T) + Send>,
    on_error: Option<Box<dyn FnMut(StreamError) + Send>>,
    on_complete: Option<Box<dyn FnMut() + Send>>,
}

impl<T> CallbackObserver<T> {
    pub fn new(on_next: impl FnMut(T) + Send + 'static) -> Self {
        Self {
            on_next: Box::new(on_next),
            on_error: None,
            on_complete: None,
        }
    }

    pub fn on_error(mut self, f: impl FnMut(StreamError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_complete(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }
}

impl<T> Observer<T> for CallbackObserver<T> {
    fn next(&mut self, value: T) {
        (self.on_next)(value)
    }

    fn error(&mut self, err: StreamError) {
        if let Some(f) = self.on_error.as_mut() {
            f(err)
        }
    }

    fn complete(&mut self) {
        if let Some(f) = self.on_complete.as_mut() {
            f()
        }
    }
}

impl<T> fmt::Debug for CallbackObserver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackObserver")
            .field("on_error", &self.on_error.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Notification<T> {
    Next(T),
    Error(StreamError),
    Complete,
}

struct Delivery<T> {
    draining: bool,
    queue: VecDeque<Notification<T>>,
}

struct Shared<T> {
    observer: Mutex<Box<dyn Observer<T>>>,
    delivery: Mutex<Delivery<T>>,
    state: Arc<SubscriptionState>,
}

/// Producer-side handle for one subscription.
///
/// Notifications are queued and handed to the observer one at a time, so an
/// observer is never called concurrently and an emission made from inside
/// an observer callback is delivered after that callback returns. A panic
/// in the observer's `next` is caught and delivered to the same observer as
/// [`StreamError::ObserverPanicked`].
pub struct Subscriber<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> Subscriber<T> {
    pub(crate) fn new(observer: impl Observer<T> + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                observer: Mutex::new(Box::new(observer)),
                delivery: Mutex::new(Delivery {
                    draining: false,
                    queue: VecDeque::new(),
                }),
                state: Arc::default(),
            }),
        }
    }

    pub fn next(&self, value: T) {
        self.push(Notification::Next(value));
    }

    pub fn error(&self, err: StreamError) {
        self.push(Notification::Error(err));
    }

    pub fn complete(&self) {
        self.push(Notification::Complete);
    }

    /// True once the subscriber terminated or was unsubscribed. Producers
    /// should stop emitting.
    pub fn is_closed(&self) -> bool {
        self.shared.state.is_closed()
    }

    /// Run `teardown` when the subscription ends, or now if it already has.
    pub fn add_teardown(&self, teardown: impl FnOnce() + Send + 'static) {
        self.shared.state.add(Box::new(teardown));
    }

    pub fn subscription(&self) -> Subscription {
        Subscription::from_state(Arc::clone(&self.shared.state))
    }

    pub fn unsubscribe(&self) {
        self.subscription().unsubscribe();
    }

    fn push(&self, notification: Notification<T>) {
        self.enqueue(notification);
        self.drain();
    }

    /// Queue without delivering. Pair with [`Subscriber::drain`].
    pub(crate) fn enqueue(&self, notification: Notification<T>) {
        if self.is_closed() {
            return;
        }
        self.lock_delivery().queue.push_back(notification);
    }

    /// Deliver queued notifications unless another caller already is.
    pub(crate) fn drain(&self) {
        {
            let mut delivery = self.lock_delivery();
            if delivery.draining {
                return;
            }
            delivery.draining = true;
        }

        loop {
            let notification = {
                let mut delivery = self.lock_delivery();
                if self.is_closed() {
                    delivery.queue.clear();
                }
                match delivery.queue.pop_front() {
                    Some(notification) => notification,
                    None => {
                        delivery.draining = false;
                        return;
                    }
                }
            };
            self.dispatch(notification);
        }
    }

    fn dispatch(&self, notification: Notification<T>) {
        match notification {
            Notification::Next(value) => {
                if self.is_closed() {
                    return;
                }
                let outcome = {
                    let mut observer = self.lock_observer();
                    catch_unwind(AssertUnwindSafe(|| observer.next(value)))
                };
                if let Err(payload) = outcome {
                    let message = panic_message(payload.as_ref());
                    tracing::warn!(panic = %message, "Observer panicked in next");
                    self.terminate(Notification::Error(StreamError::ObserverPanicked(message)));
                }
            }
            terminal => self.terminate(terminal),
        }
    }

    fn terminate(&self, notification: Notification<T>) {
        let Some(teardowns) = self.shared.state.close() else {
            return;
        };
        {
            let mut observer = self.lock_observer();
            let outcome = catch_unwind(AssertUnwindSafe(|| match notification {
                Notification::Error(err) => observer.error(err),
                Notification::Complete => observer.complete(),
                Notification::Next(_) => {}
            }));
            if outcome.is_err() {
                tracing::warn!("Observer panicked while handling termination");
            }
        }
        run_all(teardowns);
    }

    fn lock_observer(&self) -> MutexGuard<'_, Box<dyn Observer<T>>> {
        self.shared
            .observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_delivery(&self) -> MutexGuard<'_, Delivery<T>> {
        self.shared
            .delivery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> fmt::Debug for Subscriber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("closed", &self.shared.state.is_closed())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Log = Arc<Mutex<Vec<String>>>;

    fn logging_observer(log: &Log) -> CallbackObserver<i32> {
        let (on_next, on_error, on_complete) = (log.clone(), log.clone(), log.clone());
        CallbackObserver::new(move |v: i32| on_next.lock().unwrap().push(format!("next {v}")))
            .on_error(move |e| on_error.lock().unwrap().push(format!("error {e}")))
            .on_complete(move || on_complete.lock().unwrap().push("complete".into()))
    }

    #[test]
    fn nothing_is_delivered_after_complete() {
        let log = Log::default();
        let subscriber = Subscriber::new(logging_observer(&log));

        subscriber.next(1);
        subscriber.complete();
        subscriber.next(2);
        subscriber.complete();
        subscriber.error(StreamError::message("late"));

        assert_eq!(*log.lock().unwrap(), vec!["next 1", "complete"]);
        assert!(subscriber.is_closed());
    }

    #[test]
    fn panicking_next_becomes_error() {
        let log = Log::default();
        let sink = log.clone();
        let observer = CallbackObserver::new(|v: i32| {
            if v == 2 {
                panic!("cannot handle two");
            }
        })
        .on_error(move |e| sink.lock().unwrap().push(e.to_string()));
        let subscriber = Subscriber::new(observer);

        subscriber.next(1);
        subscriber.next(2);
        subscriber.next(3);

        assert_eq!(
            *log.lock().unwrap(),
            vec!["observer panicked: cannot handle two"]
        );
        assert!(subscriber.is_closed());
    }

    #[test]
    fn terminal_runs_teardowns() {
        let log = Log::default();
        let subscriber = Subscriber::new(logging_observer(&log));
        let sink = log.clone();
        subscriber.add_teardown(move || sink.lock().unwrap().push("teardown".into()));

        subscriber.error(StreamError::message("boom"));
        assert_eq!(*log.lock().unwrap(), vec!["error boom", "teardown"]);
    }

    #[test]
    fn closure_is_an_observer() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let subscriber = Subscriber::new(move |v: i32| sink.lock().unwrap().push(v));
        subscriber.next(4);
        subscriber.next(5);
        assert_eq!(*seen.lock().unwrap(), vec![4, 5]);
    }
}
