//! In-process resilience toolkit.
//!
//! # Architecture Overview
//!
//! ```text
//!   caller
//!     │
//!     ├─▶ pool        bounded fan-out over work items
//!     │     └─▶ resilience   circuit breaker → retry/backoff → timeout
//!     ├─▶ cache       LRU + TTL store, memoize / memoize_async
//!     ├─▶ rate_limit  debounce / throttle
//!     └─▶ stream      Observable, operators, Subject / BehaviorSubject
//!
//!   cross-cutting: config (TOML), error, observability (tracing + metrics)
//! ```
//!
//! Every primitive is usable on its own. Anything that waits uses
//! `tokio::time` and must run inside a tokio runtime.

pub mod cache;
pub mod config;
pub mod error;
pub mod observability;
pub mod pool;
pub mod rate_limit;
pub mod resilience;
pub mod simulation;
pub mod stream;
mod time;

pub use cache::{memoize, memoize_async, LruCache};
pub use config::ToolkitConfig;
pub use error::{CircuitError, ShortCircuitError, StreamError, TimeoutError, ValidationError};
pub use pool::ConcurrencyPool;
pub use rate_limit::{debounce, throttle};
pub use resilience::{with_retry, with_timeout, CircuitBreaker, CircuitState, RetryPolicy};
pub use stream::{BehaviorSubject, Observable, Observer, Subject, Subscription};
