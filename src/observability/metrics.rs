//! Metrics collection.
//!
//! # Metrics
//! - `steadfast_circuit_transitions_total` (counter): state changes by breaker, target state
//! - `steadfast_circuit_rejections_total` (counter): short-circuited calls by breaker
//! - `steadfast_retry_attempts_total` (counter): retries scheduled
//! - `steadfast_timeouts_total` (counter): guarded operations that hit their deadline
//! - `steadfast_cache_lookups_total` (counter): lookups by result (hit, miss, expired)
//! - `steadfast_cache_evictions_total` (counter): capacity evictions
//! - `steadfast_pool_items_total` (counter): pool items by outcome
//!
//! # Design Decisions
//! - Facade only; the recorder is chosen by the application
//! - Labels are low-cardinality (breaker names are chosen by the caller)

use metrics::counter;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::resilience::circuit_breaker::CircuitState;

/// Install a Prometheus recorder as the global metrics recorder.
///
/// The returned handle renders the text exposition format on demand.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

pub fn record_circuit_transition(breaker: &str, to: CircuitState) {
    counter!(
        "steadfast_circuit_transitions_total",
        "breaker" => breaker.to_string(),
        "to" => to.as_str()
    )
    .increment(1);
}

pub fn record_circuit_rejection(breaker: &str) {
    counter!("steadfast_circuit_rejections_total", "breaker" => breaker.to_string()).increment(1);
}

pub fn record_retry_attempt() {
    counter!("steadfast_retry_attempts_total").increment(1);
}

pub fn record_timeout() {
    counter!("steadfast_timeouts_total").increment(1);
}

/// Result label for a cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Hit,
    Miss,
    Expired,
}

impl Lookup {
    fn as_str(self) -> &'static str {
        match self {
            Lookup::Hit => "hit",
            Lookup::Miss => "miss",
            Lookup::Expired => "expired",
        }
    }
}

pub fn record_cache_lookup(result: Lookup) {
    counter!("steadfast_cache_lookups_total", "result" => result.as_str()).increment(1);
}

pub fn record_cache_eviction() {
    counter!("steadfast_cache_evictions_total").increment(1);
}

pub fn record_pool_item(fulfilled: bool) {
    let outcome = if fulfilled { "fulfilled" } else { "rejected" };
    counter!("steadfast_pool_items_total", "outcome" => outcome).increment(1);
}
