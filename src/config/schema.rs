//! Configuration schema definitions.
//!
//! This module defines the parameters of every primitive in the toolkit.
//! All types derive Serde traits for deserialization from config files.
//! Durations are stored as integer milliseconds and exposed as `Duration`
//! through accessors.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the toolkit.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ToolkitConfig {
    /// Circuit breaker defaults.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry-with-backoff defaults.
    pub retry: RetryConfig,

    /// Timeout guard defaults.
    pub timeout: TimeoutConfig,

    /// Concurrency pool defaults.
    pub pool: PoolConfig,

    /// LRU cache / memoizer defaults.
    pub cache: CacheConfig,

    /// Debounce defaults.
    pub debounce: DebounceConfig,

    /// Throttle defaults.
    pub throttle: ThrottleConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in CLOSED that open the circuit.
    pub failure_threshold: u32,

    /// Time the circuit stays OPEN before admitting a probe, in milliseconds.
    pub reset_timeout_ms: u64,

    /// Trial calls admitted while HALF_OPEN.
    pub half_open_max_calls: u32,

    /// Successful trials needed to close the circuit again.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 30_000,
            half_open_max_calls: 1,
            success_threshold: 1,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_half_open_max_calls(mut self, calls: u32) -> Self {
        self.half_open_max_calls = calls;
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,

    /// Delay before the second attempt in milliseconds.
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay in milliseconds.
    pub max_delay_ms: u64,

    /// Factor applied to the delay after every retry.
    pub backoff_multiplier: f64,

    /// Randomize each delay into `[delay / 2, delay]`.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 2000,
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for a single guarded operation in milliseconds.
    pub duration_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { duration_ms: 5000 }
    }
}

impl TimeoutConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Concurrency pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of logical workers draining the queue.
    pub concurrency: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries.
    pub max_size: usize,

    /// Optional time-to-live for every entry in milliseconds.
    pub ttl_ms: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            ttl_ms: None,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_ms.map(Duration::from_millis)
    }
}

/// Debounce configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct DebounceConfig {
    /// Quiet period after the last call in milliseconds.
    pub delay_ms: u64,

    /// Invoke on the first call of a burst.
    pub leading: bool,

    /// Invoke once the burst has been quiet for `delay_ms`.
    pub trailing: bool,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            delay_ms: 100,
            leading: false,
            trailing: true,
        }
    }
}

impl DebounceConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Throttle configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Window length in milliseconds.
    pub limit_ms: u64,

    /// Invoke immediately when outside a window.
    pub leading: bool,

    /// Invoke once at the end of a window with the latest arguments.
    pub trailing: bool,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            limit_ms: 100,
            leading: true,
            trailing: true,
        }
    }
}

impl ThrottleConfig {
    pub fn limit(&self) -> Duration {
        Duration::from_millis(self.limit_ms)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Install the Prometheus recorder in the CLI.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: ToolkitConfig = toml::from_str(
            r#"
            [circuit_breaker]
            failure_threshold = 2

            [cache]
            max_size = 16
            ttl_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.circuit_breaker.failure_threshold, 2);
        assert_eq!(config.circuit_breaker.reset_timeout_ms, 30_000);
        assert_eq!(config.cache.ttl(), Some(Duration::from_millis(500)));
        assert_eq!(config.retry, RetryConfig::default());
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn builders_convert_durations_to_millis() {
        let breaker = CircuitBreakerConfig::default()
            .with_failure_threshold(3)
            .with_reset_timeout(Duration::from_secs(2));
        assert_eq!(breaker.reset_timeout_ms, 2000);
        assert_eq!(breaker.reset_timeout(), Duration::from_secs(2));

        let retry = RetryConfig::default()
            .with_initial_delay(Duration::from_millis(10))
            .with_max_delay(Duration::from_millis(80));
        assert_eq!(retry.initial_delay(), Duration::from_millis(10));
        assert_eq!(retry.max_delay(), Duration::from_millis(80));
    }

    #[test]
    fn default_edges() {
        let debounce = DebounceConfig::default();
        assert!(!debounce.leading && debounce.trailing);

        let throttle = ThrottleConfig::default();
        assert!(throttle.leading && throttle.trailing);
    }
}
