//! Fixed-concurrency fan-out over a list of work items.

use futures_util::future::join_all;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use crate::config::PoolConfig;
use crate::error::ValidationError;
use crate::observability::metrics;
use crate::pool::report::PoolReport;

/// Runs `processor(item, index)` over many items with at most `concurrency`
/// operations in flight.
#[derive(Debug, Clone)]
pub struct ConcurrencyPool<P> {
    processor: P,
    concurrency: usize,
}

impl<P> ConcurrencyPool<P> {
    pub fn new(processor: P, concurrency: usize) -> Result<Self, ValidationError> {
        if concurrency == 0 {
            return Err(ValidationError::new("pool.concurrency", "must be at least 1"));
        }
        Ok(Self {
            processor,
            concurrency,
        })
    }

    pub fn from_config(processor: P, config: &PoolConfig) -> Result<Self, ValidationError> {
        Self::new(processor, config.concurrency)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Process every item once and report each outcome by original index.
    ///
    /// Never fails as a whole: item errors land in `PoolReport::rejected`.
    pub async fn process<I, Fut, T, E>(
        &self,
        items: impl IntoIterator<Item = I>,
    ) -> PoolReport<T, E>
    where
        P: Fn(I, usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let queue: VecDeque<(usize, I)> = items.into_iter().enumerate().collect();
        let total = queue.len();
        let workers = self.concurrency.min(total);
        let queue = Mutex::new(queue);

        tracing::debug!(items = total, workers, "Pool started");

        let finished = join_all((0..workers).map(|_| self.drain(&queue))).await;

        let mut report = PoolReport::with_capacity(total);
        for (index, outcome) in finished.into_iter().flatten() {
            report.record(index, outcome);
        }

        tracing::debug!(
            fulfilled = report.fulfilled.len(),
            rejected = report.rejected.len(),
            "Pool finished"
        );
        report
    }

    /// One worker: pull from the shared queue until it is empty.
    async fn drain<I, Fut, T, E>(
        &self,
        queue: &Mutex<VecDeque<(usize, I)>>,
    ) -> Vec<(usize, Result<T, E>)>
    where
        P: Fn(I, usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut done = Vec::new();
        loop {
            let next = queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
            let Some((index, item)) = next else {
                break;
            };

            let outcome = (self.processor)(item, index).await;
            if outcome.is_err() {
                tracing::debug!(index, "Pool item failed");
            }
            metrics::record_pool_item(outcome.is_ok());
            done.push((index, outcome));
        }
        done
    }
}
