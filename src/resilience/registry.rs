//! Named circuit breakers shared across call sites.

use dashmap::DashMap;
use std::sync::Arc;

use crate::config::CircuitBreakerConfig;
use crate::config::validation;
use crate::error::ValidationError;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitMetrics, CircuitState};

/// One breaker per dependency name, created on first use.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    pub fn new(default_config: CircuitBreakerConfig) -> Result<Self, ValidationError> {
        validation::circuit_breaker(&default_config)?;
        Ok(Self {
            breakers: DashMap::new(),
            default_config,
        })
    }

    /// Get or create the breaker for `name`.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(name) {
            return breaker.clone();
        }
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(self.build(name)))
            .clone()
    }

    /// State of `name`, if a breaker exists for it.
    pub fn state_of(&self, name: &str) -> Option<CircuitState> {
        self.breakers.get(name).map(|b| b.state())
    }

    /// A dependency without a breaker yet counts as healthy.
    pub fn is_healthy(&self, name: &str) -> bool {
        self.state_of(name)
            .map(|s| s != CircuitState::Open)
            .unwrap_or(true)
    }

    /// Metrics for every breaker, sorted by name.
    pub fn snapshot(&self) -> Vec<(String, CircuitMetrics)> {
        let mut all: Vec<_> = self
            .breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().metrics()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Close every breaker. Handles already given out stay valid.
    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().force_closed();
        }
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    fn build(&self, name: &str) -> CircuitBreaker {
        tracing::debug!(breaker = %name, "Creating circuit breaker");
        CircuitBreaker::prevalidated(name, self.default_config.clone())
    }
}
