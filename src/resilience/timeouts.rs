//! Timeout enforcement.
//!
//! # Responsibilities
//! - Race an operation against a deadline
//! - Cancel the operation cleanly when the deadline wins
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from the operation's own errors
//! - Cancellation is dropping the inner future; nothing keeps running

use std::future::Future;
use std::time::Duration;

use crate::config::TimeoutConfig;
use crate::error::TimeoutError;
use crate::observability::metrics;

/// Await `future` for at most `duration`.
pub async fn with_timeout<F>(future: F, duration: Duration) -> Result<F::Output, TimeoutError>
where
    F: Future,
{
    match tokio::time::timeout(duration, future).await {
        Ok(output) => Ok(output),
        Err(_) => {
            tracing::debug!(timeout_ms = duration.as_millis() as u64, "Operation timed out");
            metrics::record_timeout();
            Err(TimeoutError { duration })
        }
    }
}

/// A reusable deadline applied to any number of operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutGuard {
    duration: Duration,
}

impl TimeoutGuard {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output, TimeoutError> {
        with_timeout(future, self.duration).await
    }
}

impl From<&TimeoutConfig> for TimeoutGuard {
    fn from(config: &TimeoutConfig) -> Self {
        Self::new(config.duration())
    }
}
