//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a dependency:
//!     → registry.rs (look up the shared breaker for the dependency)
//!     → circuit_breaker.rs (admit or short-circuit, track outcomes)
//!     → retries.rs (re-run retryable failures on a backoff.rs schedule)
//!     → timeouts.rs (bound each attempt with a deadline)
//! ```
//!
//! # Design Decisions
//! - Each primitive is standalone; layering is done by wrapping closures
//! - Errors of the wrapped operation pass through untouched
//! - All waiting happens on `tokio::time`, so paused-clock tests are exact

pub mod backoff;
pub mod circuit_breaker;
pub mod registry;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{CircuitBreaker, CircuitMetrics, CircuitState};
pub use registry::CircuitBreakerRegistry;
pub use retries::{with_retry, RetryAttempt, RetryPolicy};
pub use timeouts::{with_timeout, TimeoutGuard};
