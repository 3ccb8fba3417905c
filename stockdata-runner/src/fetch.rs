//! Fetch coordinator: one provider call per symbol on a bounded private pool.
//!
//! Each call builds its own rayon pool of `min(symbols, max_workers)` threads
//! so a run never competes with the global pool. Workers share nothing but
//! the provider; every result comes back paired with its symbol, in input
//! order.

use crate::config::PoolConfig;
use crate::pipeline::RunError;
use log::{debug, warn};
use rayon::prelude::*;
use stockdata_core::data::{QuoteError, QuoteProvider};
use stockdata_core::domain::{QuoteRecord, RequestWindow};

/// Results of one fetch pass.
#[derive(Debug, Default)]
pub struct FetchBatch {
    /// Exactly one entry per requested symbol, in request order.
    pub results: Vec<(String, Result<QuoteRecord, QuoteError>)>,
    pub succeeded: usize,
    pub failed: usize,
}

impl FetchBatch {
    fn from_results(results: Vec<(String, Result<QuoteRecord, QuoteError>)>) -> Self {
        let succeeded = results.iter().filter(|(_, r)| r.is_ok()).count();
        let failed = results.len() - succeeded;
        Self {
            results,
            succeeded,
            failed,
        }
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// Successfully fetched records.
    pub fn records(&self) -> impl Iterator<Item = &QuoteRecord> {
        self.results.iter().filter_map(|(_, r)| r.as_ref().ok())
    }

    pub fn errors(&self) -> impl Iterator<Item = (&str, &QuoteError)> {
        self.results
            .iter()
            .filter_map(|(s, r)| r.as_ref().err().map(|e| (s.as_str(), e)))
    }
}

/// Threads used for `symbols` requests under a cap of `max_workers`.
pub fn worker_count(symbols: usize, max_workers: usize) -> usize {
    symbols.min(max_workers.max(1))
}

/// Fetch every symbol concurrently. Per-symbol failures land in the batch.
///
/// Only a failure to build the worker pool is an error. With no symbols no
/// pool is built and the provider is never called.
pub fn fetch_all(
    provider: &dyn QuoteProvider,
    symbols: &[String],
    window: RequestWindow,
    pool: &PoolConfig,
) -> Result<FetchBatch, RunError> {
    if symbols.is_empty() {
        return Ok(FetchBatch::default());
    }

    let threads = worker_count(symbols.len(), pool.max_workers);
    debug!(
        "fetching {} symbols from {} on {threads} workers",
        symbols.len(),
        provider.name()
    );

    let tp = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("stockdata-fetch-{i}"))
        .build()
        .map_err(|e| RunError::WorkerPool(e.to_string()))?;

    let results: Vec<(String, Result<QuoteRecord, QuoteError>)> = tp.install(|| {
        symbols
            .par_iter()
            .map(|symbol| (symbol.clone(), provider.fetch(symbol, window)))
            .collect()
    });

    let batch = FetchBatch::from_results(results);
    for (symbol, err) in batch.errors() {
        warn!("no data for {symbol}: {err}");
    }
    Ok(batch)
}
