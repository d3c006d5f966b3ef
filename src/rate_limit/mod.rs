//! Call-coalescing wrappers.
//!
//! # Data Flow
//! ```text
//! caller → Debounced::call / Throttled::call
//!     → state under mutex (latest args, window bookkeeping)
//!     → leading edge: invoke now, outside the lock
//!     → trailing edge: timer.rs arms a tokio task that invokes later
//! ```
//!
//! # Design Decisions
//! - Each wrapper owns one mutex-guarded state struct
//! - Timers are tokio tasks; re-arming or cancelling aborts the old task and
//!   bumps a generation, and a firing task re-checks that generation under
//!   the lock, so nothing fires after `cancel()`
//! - The wrapped function always runs outside the lock
//! - Calls must be made from within a tokio runtime

pub mod debounce;
pub mod throttle;
pub(crate) mod timer;

pub use debounce::{debounce, DebounceOptions, Debounced};
pub use throttle::{throttle, ThrottleOptions, Throttled};
