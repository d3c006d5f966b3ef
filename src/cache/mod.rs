//! Caching subsystem.
//!
//! # Data Flow
//! ```text
//! memoize(fn) / memoize_async(fn)
//!     → key: key generator or serde_json of the arguments
//!     → lru.rs (hit: clone value, miss: compute and store)
//!     → capacity reached: least-recently-used entry evicted
//! ```
//!
//! # Design Decisions
//! - One mutex around the `lru` store and its stats; never held while user
//!   code runs
//! - TTL is checked lazily on access; `purge_expired` is the only sweep
//! - Async memoization stores the shared in-flight future, so concurrent
//!   callers with one key trigger one computation

pub mod lru;
pub mod memoize;

pub use self::lru::{CacheStats, LruCache};
pub use memoize::{
    memoize, memoize_async, memoize_async_with_key, memoize_with_key, MemoizeOptions, Memoized,
    MemoizedAsync,
};
