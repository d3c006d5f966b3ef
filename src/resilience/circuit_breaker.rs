//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: a bounded number of trial calls test for recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: first call after reset_timeout (that call is the probe)
//! Half-Open → Closed: successful trials >= success_threshold
//! Half-Open → Open: any trial fails
//! ```
//!
//! # Design Decisions
//! - One mutex around the whole state struct; admission (check + increment)
//!   and outcome recording each happen in a single critical section
//! - The lock is never held across the wrapped operation
//! - Every transition bumps a generation; outcomes of calls admitted under an
//!   older generation only update timestamps
//! - A call whose future is dropped before completing is not an outcome.
//!   In Half-Open it hands its trial slot back; otherwise nothing changes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::validation;
use crate::config::CircuitBreakerConfig;
use crate::error::{CircuitError, ShortCircuitError, ValidationError};
use crate::observability::metrics;
use crate::time::deadline_after;

/// States of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - calls allowed.
    Closed,
    /// Failing fast - calls immediately rejected.
    Open,
    /// Testing if the dependency recovered - limited calls allowed.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only snapshot of a breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitMetrics {
    pub state: CircuitState,
    /// Consecutive failures while Closed.
    pub failure_count: u32,
    /// Successful trials while Half-Open.
    pub success_count: u32,
    /// Trials admitted in the current Half-Open period.
    pub half_open_calls: u32,
    pub total_calls: u64,
    pub rejected_calls: u64,
    #[serde(skip)]
    pub last_failure_time: Option<Instant>,
    #[serde(skip)]
    pub last_success_time: Option<Instant>,
    #[serde(skip)]
    pub next_attempt: Option<Instant>,
}

impl CircuitMetrics {
    /// Time left until an Open breaker admits a probe.
    pub fn retry_after(&self) -> Option<Duration> {
        match (self.state, self.next_attempt) {
            (CircuitState::Open, Some(at)) => Some(at.saturating_duration_since(Instant::now())),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    generation: u64,
    failure_count: u32,
    success_count: u32,
    half_open_calls: u32,
    total_calls: u64,
    rejected_calls: u64,
    last_failure_time: Option<Instant>,
    last_success_time: Option<Instant>,
    next_attempt: Option<Instant>,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            generation: 0,
            failure_count: 0,
            success_count: 0,
            half_open_calls: 0,
            total_calls: 0,
            rejected_calls: 0,
            last_failure_time: None,
            last_success_time: None,
            next_attempt: None,
        }
    }
}

/// Circuit breaker guarding a single dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a breaker named `default`.
    pub fn new(config: CircuitBreakerConfig) -> Result<Self, ValidationError> {
        Self::named("default", config)
    }

    /// Create a breaker whose name appears in logs, metrics and rejections.
    pub fn named(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
    ) -> Result<Self, ValidationError> {
        validation::circuit_breaker(&config)?;
        Ok(Self::prevalidated(name, config))
    }

    pub(crate) fn prevalidated(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Run `operation` through the breaker.
    ///
    /// Rejected calls never invoke `operation`. The operation's own error is
    /// returned unchanged inside `CircuitError::Operation`.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.admit()?;
        match operation().await {
            Ok(value) => {
                permit.settle(true);
                Ok(value)
            }
            Err(err) => {
                permit.settle(false);
                Err(CircuitError::Operation(err))
            }
        }
    }

    /// Current state. Does not advance Open → Half-Open.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn metrics(&self) -> CircuitMetrics {
        let inner = self.lock();
        CircuitMetrics {
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            half_open_calls: inner.half_open_calls,
            total_calls: inner.total_calls,
            rejected_calls: inner.rejected_calls,
            last_failure_time: inner.last_failure_time,
            last_success_time: inner.last_success_time,
            next_attempt: inner.next_attempt,
        }
    }

    /// Open the circuit now, starting a fresh reset timeout.
    pub fn force_open(&self) {
        let mut inner = self.lock();
        self.transition(&mut inner, CircuitState::Open, Instant::now());
    }

    /// Close the circuit now and clear all counters.
    pub fn force_closed(&self) {
        let mut inner = self.lock();
        self.transition(&mut inner, CircuitState::Closed, Instant::now());
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(&self) -> Result<Permit<'_>, ShortCircuitError> {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.total_calls += 1;

        let rejection = match inner.state {
            CircuitState::Closed => None,
            CircuitState::Open => {
                let next_attempt = inner.next_attempt.unwrap_or(now);
                if now >= next_attempt {
                    self.transition(&mut inner, CircuitState::HalfOpen, now);
                    inner.half_open_calls = 1;
                    None
                } else {
                    Some((CircuitState::Open, Some(next_attempt - now)))
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_calls < self.config.half_open_max_calls {
                    inner.half_open_calls += 1;
                    None
                } else {
                    Some((CircuitState::HalfOpen, None))
                }
            }
        };

        if let Some((state, retry_after)) = rejection {
            inner.rejected_calls += 1;
            drop(inner);
            tracing::debug!(
                breaker = %self.name,
                state = %state,
                ?retry_after,
                "Call short-circuited"
            );
            metrics::record_circuit_rejection(&self.name);
            return Err(ShortCircuitError {
                breaker: self.name.clone(),
                state,
                retry_after,
            });
        }

        Ok(Permit {
            breaker: self,
            generation: inner.generation,
            settled: false,
        })
    }

    fn on_success(&self, generation: u64) {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.last_success_time = Some(now);
        if generation != inner.generation {
            return;
        }

        match inner.state {
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    self.transition(&mut inner, CircuitState::Closed, now);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, generation: u64) {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.last_failure_time = Some(now);
        if generation != inner.generation {
            return;
        }

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open, now);
                }
            }
            // Any trial failure reopens immediately
            CircuitState::HalfOpen => self.transition(&mut inner, CircuitState::Open, now),
            CircuitState::Open => {}
        }
    }

    /// A cancelled call. Frees its Half-Open trial slot so the next caller
    /// can test the dependency; Closed counters are left alone.
    fn on_abandoned(&self, generation: u64) {
        let mut inner = self.lock();
        if generation == inner.generation && inner.state == CircuitState::HalfOpen {
            inner.half_open_calls = inner.half_open_calls.saturating_sub(1);
        }
    }

    fn transition(&self, inner: &mut BreakerState, to: CircuitState, now: Instant) {
        let from = inner.state;
        inner.state = to;
        inner.generation += 1;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.half_open_calls = 0;
        inner.next_attempt = match to {
            CircuitState::Open => Some(deadline_after(now, self.config.reset_timeout())),
            _ => None,
        };

        match to {
            CircuitState::Open => tracing::warn!(
                breaker = %self.name,
                from = %from,
                to = %to,
                reset_timeout_ms = self.config.reset_timeout_ms,
                "Circuit opened"
            ),
            _ => tracing::info!(
                breaker = %self.name,
                from = %from,
                to = %to,
                "Circuit state changed"
            ),
        }
        metrics::record_circuit_transition(&self.name, to);
    }
}

/// Admission ticket for one call. Dropping it unsettled releases the slot.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    settled: bool,
}

impl Permit<'_> {
    fn settle(mut self, success: bool) {
        self.settled = true;
        if success {
            self.breaker.on_success(self.generation);
        } else {
            self.breaker.on_failure(self.generation);
        }
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!(breaker = %self.breaker.name, "Call abandoned before completion");
            self.breaker.on_abandoned(self.generation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, PartialEq)]
    struct Boom;

    fn config(threshold: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig::default()
            .with_failure_threshold(threshold)
            .with_reset_timeout(Duration::from_secs(10))
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), CircuitError<Boom>> {
        cb.execute(|| async { Err::<(), _>(Boom) }).await
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<(), CircuitError<Boom>> {
        cb.execute(|| async { Ok::<_, Boom>(()) }).await
    }

    #[tokio::test]
    async fn starts_closed() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig::default()).unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(succeed(&cb).await.is_ok());
    }

    #[test]
    fn rejects_invalid_config() {
        let err = CircuitBreaker::new(config(0)).unwrap_err();
        assert_eq!(err.field, "circuit_breaker.failure_threshold");
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_and_short_circuits() {
        let cb = CircuitBreaker::named("db", config(3)).unwrap();

        for _ in 0..2 {
            assert!(matches!(fail(&cb).await, Err(CircuitError::Operation(Boom))));
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(fail(&cb).await.is_err());
        assert_eq!(cb.state(), CircuitState::Open);

        let invoked = AtomicU32::new(0);
        let result = cb
            .execute(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Boom>(())
            })
            .await;

        match result {
            Err(CircuitError::Rejected(err)) => {
                assert_eq!(err.breaker, "db");
                assert_eq!(err.state, CircuitState::Open);
                assert_eq!(err.retry_after, Some(Duration::from_secs(10)));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let cb = CircuitBreaker::new(config(3)).unwrap();

        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();
        succeed(&cb).await.unwrap();
        assert_eq!(cb.metrics().failure_count, 0);

        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Closed);
        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_after_reset_timeout_closes_circuit() {
        let cb = CircuitBreaker::new(config(1)).unwrap();
        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(fail(&cb).await.unwrap_err().is_rejected());

        tokio::time::advance(Duration::from_secs(1)).await;
        // state() does not advance Open → Half-Open on its own
        assert_eq!(cb.state(), CircuitState::Open);
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.metrics().next_attempt, None);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_trial_reopens_with_new_deadline() {
        let cb = CircuitBreaker::new(config(1)).unwrap();
        fail(&cb).await.unwrap_err();

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(matches!(fail(&cb).await, Err(CircuitError::Operation(Boom))));
        assert_eq!(cb.state(), CircuitState::Open);

        assert_eq!(cb.metrics().retry_after(), Some(Duration::from_secs(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_admits_at_most_max_calls() {
        let cb = Arc::new(
            CircuitBreaker::new(
                config(1)
                    .with_half_open_max_calls(2)
                    .with_success_threshold(2),
            )
            .unwrap(),
        );
        fail(&cb).await.unwrap_err();
        tokio::time::advance(Duration::from_secs(10)).await;

        let invoked = Arc::new(AtomicU32::new(0));
        let mut trials = Vec::new();
        for _ in 0..2 {
            let cb = cb.clone();
            let invoked = invoked.clone();
            trials.push(tokio::spawn(async move {
                cb.execute(|| async move {
                    invoked.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok::<_, Boom>(())
                })
                .await
            }));
        }

        // Let both trials get admitted and park on their sleep
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let excess = succeed(&cb).await.unwrap_err();
        match excess {
            CircuitError::Rejected(err) => assert_eq!(err.state, CircuitState::HalfOpen),
            other => panic!("expected rejection, got {other:?}"),
        }

        for trial in trials {
            trial.await.unwrap().unwrap();
        }
        assert_eq!(invoked.load(Ordering::SeqCst), 2);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn counts_total_and_rejected_calls() {
        let cb = CircuitBreaker::new(config(2)).unwrap();
        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();
        succeed(&cb).await.unwrap_err();

        let metrics = cb.metrics();
        assert_eq!(metrics.total_calls, 4);
        assert_eq!(metrics.rejected_calls, 2);
        assert!(metrics.last_failure_time.is_some());
        assert_eq!(metrics.last_success_time, None);
    }

    #[tokio::test]
    async fn force_open_and_force_closed() {
        let cb = CircuitBreaker::new(config(5)).unwrap();

        cb.force_open();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(succeed(&cb).await.unwrap_err().is_rejected());

        cb.force_closed();
        assert_eq!(cb.state(), CircuitState::Closed);
        succeed(&cb).await.unwrap();
    }

    #[tokio::test]
    async fn stale_outcome_does_not_count() {
        let cb = Arc::new(CircuitBreaker::new(config(1)).unwrap());
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let slow = {
            let cb = cb.clone();
            tokio::spawn(async move {
                cb.execute(|| async move {
                    let _ = started_tx.send(());
                    let _ = rx.await;
                    Err::<(), _>(Boom)
                })
                .await
            })
        };
        started_rx.await.unwrap();

        // Admitted while Closed, finishes after an admin reset
        cb.force_open();
        cb.force_closed();
        tx.send(()).unwrap();
        slow.await.unwrap().unwrap_err();

        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.metrics().failure_count, 0);
    }

    async fn abandon(cb: &CircuitBreaker) {
        let call = cb.execute(|| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, Boom>(())
        });
        assert!(tokio::time::timeout(Duration::from_millis(10), call).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_call_is_not_a_failure_while_closed() {
        let cb = CircuitBreaker::new(config(1)).unwrap();
        abandon(&cb).await;

        let metrics = cb.metrics();
        assert_eq!(metrics.state, CircuitState::Closed);
        assert_eq!(metrics.failure_count, 0);
        assert_eq!(metrics.last_failure_time, None);
        succeed(&cb).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_trial_frees_its_half_open_slot() {
        let cb = CircuitBreaker::new(config(1)).unwrap();
        fail(&cb).await.unwrap_err();
        tokio::time::advance(Duration::from_secs(10)).await;

        abandon(&cb).await;
        let metrics = cb.metrics();
        assert_eq!(metrics.state, CircuitState::HalfOpen);
        assert_eq!(metrics.half_open_calls, 0);

        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_reset_timeout_stays_open() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            reset_timeout_ms: u64::MAX,
            ..config(1)
        })
        .unwrap();
        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(86_400)).await;
        match succeed(&cb).await.unwrap_err() {
            CircuitError::Rejected(err) => assert!(err.retry_after.is_some()),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(cb.metrics().retry_after().is_some());
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
