//! Bounded concurrency pool.
//!
//! # Data Flow
//! ```text
//! items
//!     → executor.rs (FIFO queue of (index, item))
//!     → min(concurrency, len) workers pull and process one item at a time
//!     → report.rs (each outcome recorded under its original index)
//! ```
//!
//! # Design Decisions
//! - Workers are futures joined on the caller's task, nothing is spawned;
//!   concurrency bounds in-flight operations, not CPU parallelism
//! - A failed item is recorded and the worker moves on; siblings never see it
//! - `process` resolves only after every item has been attempted exactly once

pub mod executor;
pub mod report;

pub use executor::ConcurrencyPool;
pub use report::{Fulfilled, PoolItemError, PoolReport};
