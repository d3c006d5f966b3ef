//! Shared utilities for integration and load testing.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyError {
    #[error("dependency unavailable (call {0})")]
    Unavailable(u32),
}

/// A fake downstream service that fails its first `fail_first` calls.
#[derive(Debug)]
pub struct FlakyDependency {
    calls: AtomicU32,
    fail_first: u32,
    latency: Duration,
}

impl FlakyDependency {
    pub fn new(fail_first: u32) -> Arc<Self> {
        Self::with_latency(fail_first, Duration::ZERO)
    }

    pub fn with_latency(fail_first: u32, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            fail_first,
            latency,
        })
    }

    /// Returns the 1-based call number on success.
    pub async fn call(&self) -> Result<u32, DependencyError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if n <= self.fail_first {
            Err(DependencyError::Unavailable(n))
        } else {
            Ok(n)
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

/// A call that never answers in test time.
#[allow(dead_code)]
pub async fn hang() -> Result<u32, DependencyError> {
    tokio::time::sleep(Duration::from_secs(3600)).await;
    Ok(0)
}
