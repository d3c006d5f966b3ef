//! Retry logic.
//!
//! # Responsibilities
//! - Re-run a failing operation up to `max_attempts` times
//! - Sleep between attempts on a multiplicative backoff schedule
//! - Let the caller decide which errors are worth retrying
//!
//! # Design Decisions
//! - The first attempt runs immediately; only retries are delayed
//! - The last operation error is returned unchanged
//! - `on_retry` is an observer only; it cannot veto or alter a retry

use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::config::validation;
use crate::config::RetryConfig;
use crate::error::ValidationError;
use crate::observability::metrics;
use crate::resilience::backoff::Backoff;

type RetryPredicate<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;
type RetryObserver<E> = Box<dyn Fn(&RetryAttempt<'_, E>) + Send + Sync>;

/// Details of a failed attempt that is about to be retried.
#[derive(Debug)]
pub struct RetryAttempt<'a, E> {
    /// 1-based number of the attempt that just failed.
    pub attempt: u32,
    /// Delay before the next attempt.
    pub delay: Duration,
    pub error: &'a E,
}

/// Reusable retry configuration plus caller-supplied hooks.
pub struct RetryPolicy<E> {
    config: RetryConfig,
    retry_if: Option<RetryPredicate<E>>,
    on_retry: Option<RetryObserver<E>>,
}

impl<E> RetryPolicy<E> {
    pub fn new(config: RetryConfig) -> Result<Self, ValidationError> {
        validation::retry(&config)?;
        Ok(Self {
            config,
            retry_if: None,
            on_retry: None,
        })
    }

    /// Only retry errors for which `predicate` returns true.
    pub fn retry_if(mut self, predicate: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.retry_if = Some(Box::new(predicate));
        self
    }

    /// Observe each retry before its delay starts.
    pub fn on_retry(
        mut self,
        observer: impl Fn(&RetryAttempt<'_, E>) + Send + Sync + 'static,
    ) -> Self {
        self.on_retry = Some(Box::new(observer));
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation`, passing it the 1-based attempt number.
    pub async fn run<F, Fut, T>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = Backoff::new(&self.config);
        let mut attempt = 1;

        loop {
            let err = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if attempt >= max_attempts {
                tracing::debug!(attempt, "Retry attempts exhausted");
                return Err(err);
            }
            if !self.is_retryable(&err) {
                tracing::debug!(attempt, "Error is not retryable");
                return Err(err);
            }

            let delay = backoff.next_delay();
            tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying after failure");
            metrics::record_retry_attempt();
            if let Some(observer) = &self.on_retry {
                observer(&RetryAttempt {
                    attempt,
                    delay,
                    error: &err,
                });
            }
            drop(err);

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn is_retryable(&self, err: &E) -> bool {
        self.retry_if.as_ref().map_or(true, |predicate| predicate(err))
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .field("retry_if", &self.retry_if.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

/// Retry every error with `config`.
///
/// Unlike [`RetryPolicy::new`] this does not validate: `max_attempts = 0`
/// behaves as 1 and a multiplier below 1.0 behaves as 1.0.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let policy = RetryPolicy {
        config: config.clone(),
        retry_if: None,
        on_retry: None,
    };
    policy.run(operation).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn config(max_attempts: u32) -> RetryConfig {
        RetryConfig::default()
            .with_max_attempts(max_attempts)
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(250))
            .with_backoff_multiplier(2.0)
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_runs_exactly_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = with_retry(&config(3), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(format!("failure #{attempt}")) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.unwrap_err(), "failure #3");
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let result = with_retry(&config(5), |attempt| async move {
            if attempt < 3 {
                Err("not yet")
            } else {
                Ok(attempt)
            }
        })
        .await;
        assert_eq!(result, Ok(3));
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_is_immediate_then_delays_grow() {
        let start = Instant::now();
        let seen = Mutex::new(Vec::new());

        let _: Result<(), ()> = with_retry(&config(4), |_| {
            seen.lock().unwrap().push(start.elapsed());
            async { Err(()) }
        })
        .await;

        let seen = seen.into_inner().unwrap();
        assert_eq!(
            seen,
            vec![
                Duration::ZERO,
                Duration::from_millis(100),
                Duration::from_millis(300),
                Duration::from_millis(550),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_returns_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(config(5))
            .unwrap()
            .retry_if(|err: &&str| *err != "fatal");

        let result: Result<(), _> = policy
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("fatal") }
            })
            .await;

        assert_eq!(result, Err("fatal"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn on_retry_sees_each_scheduled_retry() {
        let observed = Arc::new(Mutex::new(Vec::new()));
        let sink = observed.clone();
        let policy = RetryPolicy::<u32>::new(config(3)).unwrap().on_retry(move |retry| {
            sink.lock()
                .unwrap()
                .push((retry.attempt, retry.delay, *retry.error));
        });

        let _: Result<(), u32> = policy.run(|attempt| async move { Err(attempt * 10) }).await;

        assert_eq!(
            *observed.lock().unwrap(),
            vec![
                (1, Duration::from_millis(100), 10),
                (2, Duration::from_millis(200), 20),
            ]
        );
    }

    #[test]
    fn policy_rejects_invalid_config() {
        let err = RetryPolicy::<()>::new(config(0)).unwrap_err();
        assert_eq!(err.field, "retry.max_attempts");
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_still_runs_once() {
        let calls = AtomicU32::new(0);
        let _: Result<(), ()> = with_retry(&config(0), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(()) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
