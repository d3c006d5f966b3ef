//! Multiplicative backoff with optional jitter.

use rand::Rng;
use std::time::Duration;

use crate::config::RetryConfig;

/// Delay schedule between retry attempts.
///
/// Starts at `initial_delay`, multiplies by `backoff_multiplier` after every
/// step and never exceeds `max_delay`.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    max: Duration,
    multiplier: f64,
    jitter: bool,
}

impl Backoff {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            current: config.initial_delay().min(config.max_delay()),
            max: config.max_delay(),
            multiplier: if config.backoff_multiplier >= 1.0 {
                config.backoff_multiplier
            } else {
                1.0
            },
            jitter: config.jitter,
        }
    }

    /// Delay to sleep before the next attempt; advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max)
            .min(self.max);

        if self.jitter {
            apply_jitter(delay)
        } else {
            delay
        }
    }
}

/// Scale `delay` by a random factor in `[0.5, 1.0]`.
fn apply_jitter(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.5..=1.0);
    delay.mul_f64(factor)
}
