//! Reactive streams.
//!
//! # Data Flow
//! ```text
//! Cold:  Observable::of / from_iter / from_future / interval / merge
//!     → operators.rs (map, filter, scan, take, distinct_until_changed,
//!       debounce_time: one upstream subscription per downstream subscriber)
//!     → observer.rs Subscriber (per-subscriber delivery queue)
//!     → Observer
//!
//! Hot:   Subject / BehaviorSubject::next
//!     → subject.rs (queue on every current subscriber, then drain)
//!     → Observer
//! ```
//!
//! # Design Decisions
//! - Each subscriber delivers from its own queue, so an observer is never
//!   called concurrently and may emit back into its source without deadlock
//! - `error` and `complete` are terminal; the subscription closes and its
//!   teardowns run exactly once
//! - Operators link to their upstream before it starts emitting, so `take`
//!   can stop a synchronous infinite source
//! - A panicking `next` errors that subscriber only
//! - Time-based pieces (`interval`, `from_future`, `debounce_time`) spawn
//!   tokio tasks and need a runtime at subscribe time

pub mod observable;
pub mod observer;
pub mod operators;
pub mod subject;
pub mod subscription;

pub use observable::Observable;
pub use observer::{CallbackObserver, Observer, Subscriber};
pub use subject::{BehaviorSubject, Subject};
pub use subscription::Subscription;
