//! Error taxonomy shared by the primitives.
//!
//! # Design Decisions
//! - The wrapped operation's own error is never rewrapped into a string; it
//!   travels as the caller's type `E`
//! - Short-circuit, timeout and validation failures are distinct types so
//!   callers can match on them without inspecting messages
//! - Per-item pool failures and per-observer stream failures are values, not
//!   returned errors (see `pool::PoolItemError` and `StreamError`)

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::resilience::circuit_breaker::CircuitState;

/// A call rejected by a circuit breaker without invoking the operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit '{breaker}' is {state}, call rejected")]
pub struct ShortCircuitError {
    /// Name of the breaker that rejected the call.
    pub breaker: String,
    /// State the breaker was in when it rejected.
    pub state: CircuitState,
    /// Remaining wait before the breaker admits a probe (OPEN only).
    pub retry_after: Option<Duration>,
}

/// Outcome of `CircuitBreaker::execute` when it does not succeed.
#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// The breaker refused the call.
    #[error(transparent)]
    Rejected(#[from] ShortCircuitError),
    /// The operation ran and failed; its error is passed through unchanged.
    #[error("{0}")]
    Operation(E),
}

impl<E> CircuitError<E> {
    /// Returns true if the breaker short-circuited the call.
    pub fn is_rejected(&self) -> bool {
        matches!(self, CircuitError::Rejected(_))
    }

    /// The operation's own error, if the operation ran.
    pub fn into_operation(self) -> Option<E> {
        match self {
            CircuitError::Operation(e) => Some(e),
            CircuitError::Rejected(_) => None,
        }
    }
}

/// An operation did not finish before its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation timed out after {duration:?}")]
pub struct TimeoutError {
    /// The configured deadline.
    pub duration: Duration,
}

/// A single invalid parameter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `circuit_breaker.failure_threshold`.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Error notification carried by a stream.
///
/// Clonable so a `Subject` can deliver the same error to every observer.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// Error raised by a producer with a plain message.
    #[error("{0}")]
    Message(String),
    /// An observer's `next` handler panicked.
    #[error("observer panicked: {0}")]
    ObserverPanicked(String),
    /// Error raised by an underlying source.
    #[error(transparent)]
    Source(Arc<dyn std::error::Error + Send + Sync>),
}

impl StreamError {
    pub fn message(msg: impl Into<String>) -> Self {
        StreamError::Message(msg.into())
    }

    pub fn from_source<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StreamError::Source(Arc::new(err))
    }
}
