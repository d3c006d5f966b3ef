//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds >= 1, multipliers >= 1.0)
//! - Check cross-field consistency (success threshold reachable in HALF_OPEN)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ToolkitConfig → Result<(), Vec<ValidationError>>
//! - The same per-section checks run when a primitive is constructed

use crate::config::schema::{
    CacheConfig, CircuitBreakerConfig, ObservabilityConfig, PoolConfig, RetryConfig,
    ToolkitConfig,
};
pub use crate::error::ValidationError;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate every section of the configuration.
pub fn validate_config(config: &ToolkitConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_circuit_breaker(&config.circuit_breaker, &mut errors);
    check_retry(&config.retry, &mut errors);
    check_pool(&config.pool, &mut errors);
    check_cache(&config.cache, &mut errors);
    check_observability(&config.observability, &mut errors);

    if config.timeout.duration_ms == 0 {
        errors.push(ValidationError::new("timeout.duration_ms", "must be greater than 0"));
    }
    if !config.debounce.leading && !config.debounce.trailing {
        errors.push(ValidationError::new(
            "debounce",
            "at least one of leading or trailing must be enabled",
        ));
    }
    if !config.throttle.leading && !config.throttle.trailing {
        errors.push(ValidationError::new(
            "throttle",
            "at least one of leading or trailing must be enabled",
        ));
    }
    if config.throttle.limit_ms == 0 {
        errors.push(ValidationError::new("throttle.limit_ms", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

pub(crate) fn circuit_breaker(config: &CircuitBreakerConfig) -> Result<(), ValidationError> {
    first(|errors| check_circuit_breaker(config, errors))
}

pub(crate) fn retry(config: &RetryConfig) -> Result<(), ValidationError> {
    first(|errors| check_retry(config, errors))
}

fn first(check: impl FnOnce(&mut Vec<ValidationError>)) -> Result<(), ValidationError> {
    let mut errors = Vec::new();
    check(&mut errors);
    match errors.into_iter().next() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn check_circuit_breaker(config: &CircuitBreakerConfig, errors: &mut Vec<ValidationError>) {
    if config.failure_threshold == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.failure_threshold",
            "must be at least 1",
        ));
    }
    if config.half_open_max_calls == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.half_open_max_calls",
            "must be at least 1",
        ));
    }
    if config.success_threshold == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.success_threshold",
            "must be at least 1",
        ));
    } else if config.success_threshold > config.half_open_max_calls {
        errors.push(ValidationError::new(
            "circuit_breaker.success_threshold",
            format!(
                "{} can never be reached with half_open_max_calls = {}",
                config.success_threshold, config.half_open_max_calls
            ),
        ));
    }
}

fn check_retry(config: &RetryConfig, errors: &mut Vec<ValidationError>) {
    if config.max_attempts == 0 {
        errors.push(ValidationError::new("retry.max_attempts", "must be at least 1"));
    }
    if !config.backoff_multiplier.is_finite() || config.backoff_multiplier < 1.0 {
        errors.push(ValidationError::new(
            "retry.backoff_multiplier",
            "must be a finite number >= 1.0",
        ));
    }
    if config.initial_delay_ms > config.max_delay_ms {
        errors.push(ValidationError::new(
            "retry.initial_delay_ms",
            "must not exceed max_delay_ms",
        ));
    }
}

fn check_pool(config: &PoolConfig, errors: &mut Vec<ValidationError>) {
    if config.concurrency == 0 {
        errors.push(ValidationError::new("pool.concurrency", "must be at least 1"));
    }
}

fn check_cache(config: &CacheConfig, errors: &mut Vec<ValidationError>) {
    if config.max_size == 0 {
        errors.push(ValidationError::new("cache.max_size", "must be at least 1"));
    }
    if config.ttl_ms == Some(0) {
        errors.push(ValidationError::new(
            "cache.ttl_ms",
            "must be greater than 0 when set",
        ));
    }
}

fn check_observability(config: &ObservabilityConfig, errors: &mut Vec<ValidationError>) {
    if !LOG_LEVELS.contains(&config.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.log_level),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&ToolkitConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = ToolkitConfig::default();
        config.circuit_breaker.failure_threshold = 0;
        config.retry.backoff_multiplier = 0.5;
        config.pool.concurrency = 0;
        config.cache.max_size = 0;
        config.observability.log_level = "loud".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "circuit_breaker.failure_threshold",
                "retry.backoff_multiplier",
                "pool.concurrency",
                "cache.max_size",
                "observability.log_level",
            ]
        );
    }

    #[test]
    fn unreachable_success_threshold_is_rejected() {
        let config = CircuitBreakerConfig::default()
            .with_half_open_max_calls(1)
            .with_success_threshold(3);
        let err = circuit_breaker(&config).unwrap_err();
        assert_eq!(err.field, "circuit_breaker.success_threshold");
    }

    #[test]
    fn retry_delays_must_be_ordered() {
        let config = RetryConfig {
            initial_delay_ms: 500,
            max_delay_ms: 100,
            ..RetryConfig::default()
        };
        assert_eq!(retry(&config).unwrap_err().field, "retry.initial_delay_ms");
    }

    #[test]
    fn both_edges_disabled_is_rejected() {
        let mut config = ToolkitConfig::default();
        config.debounce.leading = false;
        config.debounce.trailing = false;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "debounce");
    }
}
