//! Bounded worker pool and batch failure aggregation.
//!
//! Conversions and merges are independent jobs that share nothing but the
//! filesystem. [`Workers`] runs a batch of them on a dedicated
//! [rayon](https://docs.rs/rayon) pool and acts as a barrier: a batch call
//! returns only after every job finished or failed.
//!
//! A failing job never cancels its siblings. Failures are collected into a
//! [`BatchError`] that names every failed job by its input position and
//! label, while results of the successful jobs are kept in input order, not
//! completion order.

use crate::config::{ProcessingConfig, effective_threads};
use rayon::prelude::*;
use std::fmt;

/// Dedicated thread pool sized from the processing config.
pub struct Workers {
    pool: rayon::ThreadPool,
}

impl Workers {
    pub fn new(threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("revymanus-worker-{i}"))
            .build()?;
        Ok(Self { pool })
    }

    /// Pool with `min(max_processes, cores)` threads.
    pub fn from_config(config: &ProcessingConfig) -> Result<Self, rayon::ThreadPoolBuildError> {
        Self::new(effective_threads(config))
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `job` for every item and return each outcome in input order.
    pub fn map<T, R, E, F>(&self, items: &[T], job: F) -> Vec<Result<R, E>>
    where
        T: Sync,
        R: Send,
        E: Send,
        F: Fn(&T) -> Result<R, E> + Sync,
    {
        self.pool.install(|| items.par_iter().map(&job).collect())
    }

    /// Run a batch and aggregate failures.
    ///
    /// `label` names an item in error reports (an output file, an actor).
    pub fn run<T, R, E, F, L>(&self, items: &[T], label: L, job: F) -> Result<Vec<R>, BatchError<E>>
    where
        T: Sync,
        R: Send,
        E: Send,
        F: Fn(&T) -> Result<R, E> + Sync,
        L: Fn(&T) -> String,
    {
        let outcomes = self.map(items, job);
        BatchError::collect(items, outcomes, label)
    }
}

/// One failed job of a batch.
#[derive(Debug)]
pub struct JobFailure<E> {
    /// Zero-based position in the submitted batch.
    pub index: usize,
    pub label: String,
    pub error: E,
}

/// Every failure of a batch in which at least one job failed.
#[derive(Debug)]
pub struct BatchError<E> {
    pub total: usize,
    pub failures: Vec<JobFailure<E>>,
}

impl<E> BatchError<E> {
    /// Split per-job outcomes into successes and an aggregated error.
    pub fn collect<T, R, L>(
        items: &[T],
        outcomes: Vec<Result<R, E>>,
        label: L,
    ) -> Result<Vec<R>, BatchError<E>>
    where
        L: Fn(&T) -> String,
    {
        let total = outcomes.len();
        let mut results = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for (index, (item, outcome)) in items.iter().zip(outcomes).enumerate() {
            match outcome {
                Ok(result) => results.push(result),
                Err(error) => failures.push(JobFailure {
                    index,
                    label: label(item),
                    error,
                }),
            }
        }
        if failures.is_empty() {
            Ok(results)
        } else {
            Err(BatchError { total, failures })
        }
    }

    /// Labels of the failed jobs in input order.
    pub fn failed_labels(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.label.as_str()).collect()
    }
}

impl<E: fmt::Display> fmt::Display for BatchError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} jobs failed", self.failures.len(), self.total)?;
        for failure in &self.failures {
            write!(
                f,
                "\n  job {} ({}): {}",
                failure.index + 1,
                failure.label,
                failure.error
            )?;
        }
        Ok(())
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for BatchError<E> {}
