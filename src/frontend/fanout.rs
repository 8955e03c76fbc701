//! Fan-Out Module
//!
//! Runs one operation against every store, in sequence or on a worker pool.

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::warn;

use crate::backend::BoxedBackend;
use crate::error::{Result, ShoveError};

// == Fan Out ==
/// How a multi-store frontend reaches its stores.
pub enum FanOut {
    /// Stores are visited one after another, in index order
    Sequential,
    /// One task per store on a bounded pool, joined before returning
    Pooled(ThreadPool),
}

impl FanOut {
    /// Builds a pool of `max_workers` threads.
    pub fn pooled(max_workers: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(max_workers)
            .thread_name(|i| format!("shove-fanout-{}", i))
            .build()
            .map_err(|e| ShoveError::Initialization(e.to_string()))?;
        Ok(FanOut::Pooled(pool))
    }

    pub fn workers(&self) -> usize {
        match self {
            FanOut::Sequential => 1,
            FanOut::Pooled(pool) => pool.current_num_threads(),
        }
    }

    /// Applies `op` to each store and returns the per-store outcomes in
    /// store order. A failing store never prevents the others from running.
    pub fn run<V, T, F>(&self, stores: &mut [BoxedBackend<V>], op: F) -> Vec<Result<T>>
    where
        T: Send,
        F: Fn(usize, &mut BoxedBackend<V>) -> Result<T> + Sync,
    {
        match self {
            FanOut::Sequential => stores
                .iter_mut()
                .enumerate()
                .map(|(index, store)| op(index, store))
                .collect(),
            FanOut::Pooled(pool) => {
                let mut outcomes: Vec<Option<Result<T>>> = stores.iter().map(|_| None).collect();
                let op = &op;
                pool.scope(|scope| {
                    for ((index, store), slot) in
                        stores.iter_mut().enumerate().zip(outcomes.iter_mut())
                    {
                        scope.spawn(move |_| *slot = Some(op(index, store)));
                    }
                });
                outcomes
                    .into_iter()
                    .map(|outcome| {
                        outcome.unwrap_or_else(|| {
                            Err(ShoveError::Backend("fan-out task did not run".to_string()))
                        })
                    })
                    .collect()
            }
        }
    }
}

impl std::fmt::Debug for FanOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FanOut::Sequential => f.write_str("Sequential"),
            FanOut::Pooled(pool) => write!(f, "Pooled({})", pool.current_num_threads()),
        }
    }
}

/// Splits per-store outcomes into successes and a combined fan-out error.
pub(crate) fn partition<T>(outcomes: Vec<Result<T>>) -> (Vec<Option<T>>, Option<ShoveError>) {
    let mut values = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(value) => values.push(Some(value)),
            Err(e) => {
                warn!("Store {} failed: {}", index, e);
                failures.push((index, e));
                values.push(None);
            }
        }
    }

    let error = if failures.is_empty() {
        None
    } else {
        Some(ShoveError::FanOut { failures })
    };
    (values, error)
}

/// Combines the failures of two fan-out rounds into one error.
pub(crate) fn merge_failures(
    first: Option<ShoveError>,
    second: Option<ShoveError>,
) -> Option<ShoveError> {
    match (first, second) {
        (
            Some(ShoveError::FanOut { mut failures }),
            Some(ShoveError::FanOut { failures: more }),
        ) => {
            failures.extend(more);
            failures.sort_by_key(|(index, _)| *index);
            Some(ShoveError::FanOut { failures })
        }
        (first, second) => first.or(second),
    }
}
