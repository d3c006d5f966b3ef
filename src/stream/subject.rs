//! Hot, multicast streams.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::StreamError;
use crate::stream::observable::Observable;
use crate::stream::observer::{Notification, Observer, Subscriber};
use crate::stream::subscription::Subscription;

/// What a hub remembers for late subscribers.
trait Replay<T>: Send {
    fn record(&mut self, value: &T);
    fn replay(&self) -> Option<T>;
}

/// Plain subjects remember nothing.
struct NoReplay;

impl<T> Replay<T> for NoReplay {
    fn record(&mut self, _: &T) {}

    fn replay(&self) -> Option<T> {
        None
    }
}

/// Behavior subjects remember the latest value.
struct Latest<T>(T);

impl<T: Clone + Send> Replay<T> for Latest<T> {
    fn record(&mut self, value: &T) {
        self.0 = value.clone();
    }

    fn replay(&self) -> Option<T> {
        Some(self.0.clone())
    }
}

struct HubState<T, R> {
    slots: Vec<(u64, Subscriber<T>)>,
    next_id: u64,
    terminal: Option<Notification<T>>,
    replay: R,
}

/// Shared core of `Subject` and `BehaviorSubject`.
///
/// Notifications are queued on every target subscriber while the hub lock
/// is held, then delivered after it is released. Queue order therefore
/// matches emission order, and observers can call back into the hub.
struct Hub<T, R> {
    state: Mutex<HubState<T, R>>,
}

impl<T, R> Hub<T, R>
where
    T: Clone + Send + 'static,
    R: Replay<T> + 'static,
{
    fn new(replay: R) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(HubState {
                slots: Vec::new(),
                next_id: 0,
                terminal: None,
                replay,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HubState<T, R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn attach(self: &Arc<Self>, subscriber: Subscriber<T>) {
        let id = {
            let mut state = self.lock();
            let terminal = state.terminal.clone();
            if let Some(terminal) = terminal {
                drop(state);
                subscriber.enqueue(terminal);
                subscriber.drain();
                return;
            }
            if let Some(value) = state.replay.replay() {
                subscriber.enqueue(Notification::Next(value));
            }
            let id = state.next_id;
            state.next_id += 1;
            state.slots.push((id, subscriber.clone()));
            id
        };

        let hub = Arc::downgrade(self);
        subscriber.add_teardown(move || {
            if let Some(hub) = hub.upgrade() {
                hub.lock().slots.retain(|(slot, _)| *slot != id);
            }
        });
        subscriber.drain();
    }

    fn next(&self, value: T) {
        let targets = {
            let mut state = self.lock();
            if state.terminal.is_some() {
                return;
            }
            state.replay.record(&value);
            for (_, subscriber) in &state.slots {
                subscriber.enqueue(Notification::Next(value.clone()));
            }
            state
                .slots
                .iter()
                .map(|(_, subscriber)| subscriber.clone())
                .collect::<Vec<_>>()
        };
        for subscriber in targets {
            subscriber.drain();
        }
    }

    fn terminate(&self, terminal: Notification<T>) {
        let targets = {
            let mut state = self.lock();
            if state.terminal.is_some() {
                return;
            }
            state.terminal = Some(terminal.clone());
            let slots = std::mem::take(&mut state.slots);
            for (_, subscriber) in &slots {
                subscriber.enqueue(terminal.clone());
            }
            slots
        };
        for (_, subscriber) in targets {
            subscriber.drain();
        }
    }

    fn observer_count(&self) -> usize {
        self.lock().slots.len()
    }

    fn is_closed(&self) -> bool {
        self.lock().terminal.is_some()
    }
}

fn subscribe_to<T, R>(hub: &Arc<Hub<T, R>>, observer: impl Observer<T> + 'static) -> Subscription
where
    T: Clone + Send + 'static,
    R: Replay<T> + 'static,
{
    let subscriber = Subscriber::new(observer);
    let subscription = subscriber.subscription();
    hub.attach(subscriber);
    subscription
}

fn observable_of<T, R>(hub: &Arc<Hub<T, R>>) -> Observable<T>
where
    T: Clone + Send + 'static,
    R: Replay<T> + 'static,
{
    let hub = Arc::clone(hub);
    Observable::new(move |subscriber| hub.attach(subscriber))
}

/// Multicast stream that is also an emitter.
///
/// `next`, `error` and `complete` reach every current observer. After
/// `error` or `complete` the subject is closed: further emissions are
/// ignored and late subscribers receive only the terminal notification.
pub struct Subject<T> {
    hub: Arc<Hub<T, NoReplay>>,
}

impl<T: Clone + Send + 'static> Subject<T> {
    pub fn new() -> Self {
        Self {
            hub: Hub::new(NoReplay),
        }
    }

    pub fn next(&self, value: T) {
        self.hub.next(value);
    }

    pub fn error(&self, err: StreamError) {
        self.hub.terminate(Notification::Error(err));
    }

    pub fn complete(&self) {
        self.hub.terminate(Notification::Complete);
    }

    pub fn subscribe(&self, observer: impl Observer<T> + 'static) -> Subscription {
        subscribe_to(&self.hub, observer)
    }

    /// View for applying operators. Subscribing to it subscribes here.
    pub fn as_observable(&self) -> Observable<T> {
        observable_of(&self.hub)
    }

    /// Number of live subscriptions.
    pub fn observer_count(&self) -> usize {
        self.hub.observer_count()
    }

    pub fn is_closed(&self) -> bool {
        self.hub.is_closed()
    }
}

impl<T: Clone + Send + 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            hub: Arc::clone(&self.hub),
        }
    }
}

impl<T> fmt::Debug for Subject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subject").finish_non_exhaustive()
    }
}

impl<T: Clone + Send + 'static> Observer<T> for Subject<T> {
    fn next(&mut self, value: T) {
        Subject::next(self, value)
    }

    fn error(&mut self, err: StreamError) {
        Subject::error(self, err)
    }

    fn complete(&mut self) {
        Subject::complete(self)
    }
}

/// Subject holding a current value.
///
/// A new subscriber first receives the current value, synchronously and
/// ahead of anything emitted after it subscribed.
pub struct BehaviorSubject<T> {
    hub: Arc<Hub<T, Latest<T>>>,
}

impl<T: Clone + Send + 'static> BehaviorSubject<T> {
    pub fn new(initial: T) -> Self {
        Self {
            hub: Hub::new(Latest(initial)),
        }
    }

    /// The most recent value, or the initial one if nothing was emitted.
    pub fn value(&self) -> T {
        self.hub.lock().replay.0.clone()
    }

    pub fn next(&self, value: T) {
        self.hub.next(value);
    }

    pub fn error(&self, err: StreamError) {
        self.hub.terminate(Notification::Error(err));
    }

    pub fn complete(&self) {
        self.hub.terminate(Notification::Complete);
    }

    pub fn subscribe(&self, observer: impl Observer<T> + 'static) -> Subscription {
        subscribe_to(&self.hub, observer)
    }

    pub fn as_observable(&self) -> Observable<T> {
        observable_of(&self.hub)
    }

    pub fn observer_count(&self) -> usize {
        self.hub.observer_count()
    }

    pub fn is_closed(&self) -> bool {
        self.hub.is_closed()
    }
}

impl<T> Clone for BehaviorSubject<T> {
    fn clone(&self) -> Self {
        Self {
            hub: Arc::clone(&self.hub),
        }
    }
}

impl<T> fmt::Debug for BehaviorSubject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorSubject").finish_non_exhaustive()
    }
}

impl<T: Clone + Send + 'static> Observer<T> for BehaviorSubject<T> {
    fn next(&mut self, value: T) {
        BehaviorSubject::next(self, value)
    }

    fn error(&mut self, err: StreamError) {
        BehaviorSubject::error(self, err)
    }

    fn complete(&mut self) {
        BehaviorSubject::complete(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::observer::CallbackObserver;

    type Log = Arc<Mutex<Vec<String>>>;

    fn observer(name: &'static str, log: &Log) -> CallbackObserver<i32> {
        let (on_next, on_error, on_complete) = (log.clone(), log.clone(), log.clone());
        CallbackObserver::new(move |v: i32| on_next.lock().unwrap().push(format!("{name}:{v}")))
            .on_error(move |e| on_error.lock().unwrap().push(format!("{name}:error {e}")))
            .on_complete(move || on_complete.lock().unwrap().push(format!("{name}:complete")))
    }

    #[test]
    fn broadcasts_to_current_observers_only() {
        let log = Log::default();
        let subject = Subject::new();

        subject.subscribe(observer("a", &log));
        subject.next(1);
        subject.subscribe(observer("b", &log));
        subject.next(2);

        assert_eq!(*log.lock().unwrap(), vec!["a:1", "a:2", "b:2"]);
    }

    #[test]
    fn complete_closes_and_late_subscriber_gets_terminal() {
        let log = Log::default();
        let subject = Subject::new();
        subject.subscribe(observer("a", &log));

        subject.complete();
        subject.next(9);
        subject.subscribe(observer("late", &log));

        assert_eq!(*log.lock().unwrap(), vec!["a:complete", "late:complete"]);
        assert!(subject.is_closed());
        assert_eq!(subject.observer_count(), 0);
    }

    #[test]
    fn error_reaches_every_observer_once() {
        let log = Log::default();
        let subject = Subject::new();
        subject.subscribe(observer("a", &log));
        subject.subscribe(observer("b", &log));

        subject.error(StreamError::message("down"));
        subject.error(StreamError::message("again"));
        subject.subscribe(observer("late", &log));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:error down", "b:error down", "late:error down"]
        );
    }

    #[test]
    fn unsubscribe_removes_observer() {
        let log = Log::default();
        let subject = Subject::new();
        let subscription = subject.subscribe(observer("a", &log));
        subject.subscribe(observer("b", &log));

        subscription.unsubscribe();
        subject.next(1);

        assert_eq!(*log.lock().unwrap(), vec!["b:1"]);
        assert_eq!(subject.observer_count(), 1);
    }

    #[test]
    fn panicking_observer_does_not_block_siblings() {
        let log = Log::default();
        let subject = Subject::new();
        let sink = log.clone();
        subject.subscribe(
            CallbackObserver::new(|_: i32| panic!("bad observer"))
                .on_error(move |e| sink.lock().unwrap().push(format!("bad:{e}"))),
        );
        subject.subscribe(observer("good", &log));

        subject.next(1);
        subject.next(2);

        assert_eq!(
            *log.lock().unwrap(),
            vec!["bad:observer panicked: bad observer", "good:1", "good:2"]
        );
        assert_eq!(subject.observer_count(), 1);
    }

    #[test]
    fn observer_may_emit_back_into_subject() {
        let log = Log::default();
        let subject = Subject::new();
        let echo = subject.clone();
        subject.subscribe(move |v: i32| {
            if v < 3 {
                echo.next(v + 1);
            }
        });
        subject.subscribe(observer("tail", &log));

        subject.next(1);
        assert_eq!(*log.lock().unwrap(), vec!["tail:1", "tail:2", "tail:3"]);
    }

    #[test]
    fn behavior_subject_replays_current_value_first() {
        let log = Log::default();
        let subject = BehaviorSubject::new(0);

        subject.subscribe(observer("a", &log));
        subject.next(1);
        subject.subscribe(observer("b", &log));
        subject.next(2);

        assert_eq!(*log.lock().unwrap(), vec!["a:0", "a:1", "b:1", "a:2", "b:2"]);
        assert_eq!(subject.value(), 2);
    }

    #[test]
    fn behavior_subject_replay_precedes_emission_from_replay_handler() {
        let log = Log::default();
        let subject = BehaviorSubject::new(10);
        let echo = subject.clone();
        let sink = log.clone();
        subject.subscribe(move |v: i32| {
            sink.lock().unwrap().push(v.to_string());
            if v == 10 {
                echo.next(11);
            }
        });

        assert_eq!(*log.lock().unwrap(), vec!["10", "11"]);
        assert_eq!(subject.value(), 11);
    }

    #[test]
    fn subject_can_observe_an_observable() {
        let log = Log::default();
        let subject = Subject::new();
        subject.subscribe(observer("a", &log));

        Observable::of([1, 2]).subscribe(subject.clone());
        assert_eq!(*log.lock().unwrap(), vec!["a:1", "a:2", "a:complete"]);
    }
}
