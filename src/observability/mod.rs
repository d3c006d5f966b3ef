//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Primitives produce:
//!     → tracing events (breaker transitions, retries, pool runs, evictions)
//!     → metrics.rs (counters)
//!
//! Consumers (installed by the binary, never by the library):
//!     → logging.rs (tracing-subscriber: env filter + fmt/json layer)
//!     → Prometheus recorder (rendered by `steadfast simulate --metrics`)
//! ```
//!
//! # Design Decisions
//! - The library only emits; installing subscribers and recorders is the
//!   application's job
//! - Metrics are cheap (no-ops until a recorder is installed)
//! - Hot paths log at debug/trace; only state transitions reach info/warn

pub mod logging;
pub mod metrics;
