//! Outcome of one `ConcurrencyPool::process` run.

use serde::Serialize;
use thiserror::Error;

/// An item that completed successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fulfilled<T> {
    pub index: usize,
    pub value: T,
}

/// An item whose processor returned an error. Captured, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("item {index} failed: {error}")]
pub struct PoolItemError<E> {
    pub index: usize,
    pub error: E,
}

/// Per-item outcomes. Entries appear in completion order, not input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolReport<T, E> {
    pub fulfilled: Vec<Fulfilled<T>>,
    pub rejected: Vec<PoolItemError<E>>,
}

impl<T, E> PoolReport<T, E> {
    pub(crate) fn with_capacity(len: usize) -> Self {
        Self {
            fulfilled: Vec::with_capacity(len),
            rejected: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, index: usize, outcome: Result<T, E>) {
        match outcome {
            Ok(value) => self.fulfilled.push(Fulfilled { index, value }),
            Err(error) => self.rejected.push(PoolItemError { index, error }),
        }
    }

    /// Number of items attempted.
    pub fn len(&self) -> usize {
        self.fulfilled.len() + self.rejected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all_fulfilled(&self) -> bool {
        self.rejected.is_empty()
    }

    /// One result per input, in input order.
    pub fn into_ordered(self) -> Vec<Result<T, E>> {
        let mut indexed: Vec<(usize, Result<T, E>)> = self
            .fulfilled
            .into_iter()
            .map(|f| (f.index, Ok(f.value)))
            .chain(self.rejected.into_iter().map(|r| (r.index, Err(r.error))))
            .collect();
        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, outcome)| outcome).collect()
    }
}
