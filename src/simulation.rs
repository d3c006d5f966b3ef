//! Seeded fault-injection workload behind `steadfast simulate`.
//!
//! # Data Flow
//! ```text
//! seed → StdRng → per-item plan (one step per allowed attempt)
//!     → pool (config.pool.concurrency workers)
//!     → breaker "simulated-dependency" (shared via the registry)
//!     → with_retry (config.retry)
//!     → TimeoutGuard (config.timeout) around each attempt
//! ```
//!
//! # Design Decisions
//! - The whole plan is drawn before any work starts, so a seed fixes every
//!   injected failure regardless of scheduling
//! - Latency is spread over `[latency / 2, latency * 3 / 2]`; attempts slower
//!   than the timeout count as timeouts

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

use crate::config::ToolkitConfig;
use crate::error::{CircuitError, TimeoutError, ValidationError};
use crate::pool::ConcurrencyPool;
use crate::resilience::{with_retry, CircuitBreakerRegistry, CircuitMetrics, TimeoutGuard};

/// Breaker name used for the simulated dependency.
pub const DEPENDENCY: &str = "simulated-dependency";

/// Shape of a simulated workload.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationParams {
    pub items: usize,
    /// Probability that any single attempt fails.
    pub failure_rate: f64,
    /// Mean latency of an attempt.
    pub latency: Duration,
    pub seed: u64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            items: 50,
            failure_rate: 0.2,
            latency: Duration::from_millis(10),
            seed: 42,
        }
    }
}

/// Aggregated outcome of a run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub items: usize,
    pub fulfilled: usize,
    /// Items whose last attempt hit an injected failure.
    pub failed: usize,
    /// Items whose last attempt exceeded the timeout.
    pub timed_out: usize,
    /// Items rejected by the open breaker without running.
    pub short_circuited: usize,
    /// Attempts actually started, retries included.
    pub attempts: u64,
    pub breaker: CircuitMetrics,
}

#[derive(Debug, Clone, Copy, Default)]
struct Step {
    fails: bool,
    latency: Duration,
}

#[derive(Debug, Clone, Error)]
enum AttemptError {
    #[error("injected failure")]
    Injected,
    #[error(transparent)]
    TimedOut(#[from] TimeoutError),
}

/// Run the workload described by `params` against the primitives built from
/// `config`.
pub async fn run_simulation(
    config: &ToolkitConfig,
    params: &SimulationParams,
) -> Result<SimulationReport, ValidationError> {
    if !(0.0..=1.0).contains(&params.failure_rate) {
        return Err(ValidationError::new(
            "simulate.failure_rate",
            "must be between 0.0 and 1.0",
        ));
    }

    let plans = draw_plans(params, config.retry.max_attempts.max(1));
    let registry = CircuitBreakerRegistry::new(config.circuit_breaker.clone())?;
    let breaker = registry.get_or_create(DEPENDENCY);
    let guard = TimeoutGuard::from(&config.timeout);
    let attempts = AtomicU64::new(0);

    tracing::info!(
        items = params.items,
        failure_rate = params.failure_rate,
        seed = params.seed,
        concurrency = config.pool.concurrency,
        "Simulation started"
    );

    let (breaker_ref, guard, attempts_ref, retry) = (&*breaker, &guard, &attempts, &config.retry);
    let pool = ConcurrencyPool::from_config(
        move |plan: Vec<Step>, _: usize| async move {
            breaker_ref
                .execute(move || {
                    with_retry(retry, move |attempt| {
                        let step = plan
                            .get(attempt as usize - 1)
                            .copied()
                            .unwrap_or_default();
                        attempts_ref.fetch_add(1, Ordering::Relaxed);
                        async move {
                            let outcome = guard
                                .run(async move {
                                    tokio::time::sleep(step.latency).await;
                                    if step.fails {
                                        Err(AttemptError::Injected)
                                    } else {
                                        Ok(())
                                    }
                                })
                                .await;
                            match outcome {
                                Ok(result) => result,
                                Err(timeout) => Err(AttemptError::from(timeout)),
                            }
                        }
                    })
                })
                .await
        },
        &config.pool,
    )?;

    let outcome = pool.process(plans).await;

    let mut report = SimulationReport {
        items: params.items,
        fulfilled: outcome.fulfilled.len(),
        failed: 0,
        timed_out: 0,
        short_circuited: 0,
        attempts: attempts.load(Ordering::Relaxed),
        breaker: breaker.metrics(),
    };
    for rejected in &outcome.rejected {
        match &rejected.error {
            CircuitError::Rejected(_) => report.short_circuited += 1,
            CircuitError::Operation(AttemptError::Injected) => report.failed += 1,
            CircuitError::Operation(AttemptError::TimedOut(_)) => report.timed_out += 1,
        }
    }

    tracing::info!(
        fulfilled = report.fulfilled,
        failed = report.failed,
        timed_out = report.timed_out,
        short_circuited = report.short_circuited,
        attempts = report.attempts,
        breaker_state = %report.breaker.state,
        "Simulation finished"
    );
    Ok(report)
}

fn draw_plans(params: &SimulationParams, attempts: u32) -> Vec<Vec<Step>> {
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mean = u64::try_from(params.latency.as_micros()).unwrap_or(u64::MAX);
    let (low, high) = (mean / 2, mean.saturating_add(mean / 2));

    (0..params.items)
        .map(|_| {
            (0..attempts)
                .map(|_| Step {
                    fails: rng.gen_bool(params.failure_rate),
                    latency: Duration::from_micros(rng.gen_range(low..=high)),
                })
                .collect()
        })
        .collect()
}
