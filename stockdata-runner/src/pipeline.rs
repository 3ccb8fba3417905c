//! Pipeline: resolve symbols, fetch, normalize, store.
//!
//! A run is one profile applied to one exchange and as-of date. Everything
//! that can be checked up front (profile, table name, selection) is checked
//! before the first request goes out; after that, per-symbol failures only
//! shrink the table, and an empty table ends the run without touching the
//! sink.

use crate::config::{Backend, Config, ConfigError, StorageConfig};
use crate::fetch::{fetch_all, FetchBatch};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use std::time::{Duration, Instant};
use stockdata_core::data::details::details_frame;
use stockdata_core::data::{
    validate_intraday, DetailsError, DetailsProvider, NormalizeError, Normalizer, ParquetSink,
    QuoteProvider, RegistryError, SchemaError, Selection, SqliteRegistry, SqliteSink, StoreError,
    SymbolSource, TableSink,
};
use stockdata_core::domain::Exchange;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("normalize error: {0}")]
    Normalize(#[from] NormalizeError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("worker pool: {0}")]
    WorkerPool(String),
    #[error("details error: {0}")]
    Details(#[from] DetailsError),
}

/// The three parameters every entry point takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunRequest {
    pub exchange: Exchange,
    pub as_of: NaiveDate,
    /// Symbol cap; `<= 0` means all.
    pub limit: i64,
}

impl RunRequest {
    pub fn new(exchange: Exchange, as_of: NaiveDate, limit: i64) -> Self {
        Self {
            exchange,
            as_of,
            limit,
        }
    }
}

/// What a stored run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub profile: String,
    pub exchange: Exchange,
    pub as_of: NaiveDate,
    pub table: String,
    pub symbols: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub rows: usize,
    /// blake3 of the fetched records, in symbol order.
    pub content_hash: String,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Nothing survived normalization; the sink was not called.
    NoData {
        profile: String,
        exchange: Exchange,
        symbols: usize,
        failed: usize,
    },
    Stored(RunSummary),
}

/// Run a profile end to end.
///
/// A `source` that filters by selection must use the profile's selection;
/// unfiltered sources such as `StaticSymbols` are taken as given.
pub fn run_pipeline(
    config: &Config,
    profile_name: &str,
    source: &dyn SymbolSource,
    provider: &dyn QuoteProvider,
    sink: &dyn TableSink,
    request: RunRequest,
) -> Result<RunOutcome, RunError> {
    let started = Instant::now();
    let profile = config.profile(profile_name)?;
    let table_name = config.table_for(profile, request.exchange)?;
    if let Some(selection) = source.selection() {
        if *selection != profile.selection {
            return Err(ConfigError::InvalidSelection {
                profile: profile_name.to_string(),
                reason: format!(
                    "symbol source selects {selection:?}, profile expects {:?}",
                    profile.selection
                ),
            }
            .into());
        }
    }

    let symbols = source.resolve(request.exchange, request.limit)?;
    let window = config.date_scope.window(request.as_of, request.exchange);
    info!(
        "{profile_name}: fetching {} {} symbols for {} ({window:?}) from {}",
        symbols.len(),
        request.exchange,
        request.as_of,
        provider.name()
    );

    let batch = fetch_all(provider, &symbols, window, &config.pool)?;
    let normalizer = Normalizer::new(request.exchange).with_post_process(&profile.post_process);
    let stamped_at = exchange_now(request.exchange);

    let Some(table) = normalizer.normalize(batch.records(), stamped_at)? else {
        info!(
            "{profile_name}: no data for {} ({} of {} symbols failed) in {:.2?}",
            request.exchange,
            batch.failed,
            symbols.len(),
            started.elapsed()
        );
        return Ok(RunOutcome::NoData {
            profile: profile_name.to_string(),
            exchange: request.exchange,
            symbols: symbols.len(),
            failed: batch.failed,
        });
    };

    validate_intraday(table.frame())?;
    let rows = sink.store(table.frame(), &table_name)?;

    let summary = RunSummary {
        profile: profile_name.to_string(),
        exchange: request.exchange,
        as_of: request.as_of,
        table: table_name,
        symbols: symbols.len(),
        succeeded: batch.succeeded,
        failed: batch.failed,
        rows,
        content_hash: content_hash(&batch),
        elapsed: started.elapsed(),
    };
    info!(
        "{profile_name}: stored {rows} rows from {}/{} symbols into {} via {} in {:.2?}",
        summary.succeeded,
        summary.symbols,
        summary.table,
        sink.name(),
        summary.elapsed
    );
    Ok(RunOutcome::Stored(summary))
}

/// What a details run produced.
#[derive(Debug, Clone, Serialize)]
pub struct DetailsSummary {
    pub exchange: Exchange,
    pub table: String,
    pub symbols: usize,
    pub failed: usize,
    pub rows: usize,
}

/// Enrich the listed symbols with security details, one request at a time.
pub fn run_details(
    config: &Config,
    source: &dyn SymbolSource,
    provider: &dyn DetailsProvider,
    sink: &dyn TableSink,
    request: RunRequest,
) -> Result<DetailsSummary, RunError> {
    let fields = config.details.fields()?;
    let symbols = source.resolve(request.exchange, request.limit)?;
    info!(
        "details: {} {} symbols, {} fields",
        symbols.len(),
        request.exchange,
        fields.len()
    );

    let results: Vec<_> = symbols
        .iter()
        .map(|symbol| (symbol.clone(), provider.details(symbol)))
        .collect();
    let failed = results.iter().filter(|(_, r)| r.is_err()).count();

    let summary = DetailsSummary {
        exchange: request.exchange,
        table: config.tables.details.clone(),
        symbols: symbols.len(),
        failed,
        rows: 0,
    };
    if symbols.is_empty() {
        return Ok(summary);
    }
    if failed == symbols.len() {
        warn!("details: every lookup failed, nothing stored");
        return Ok(summary);
    }

    let frame = details_frame(&results, &fields)?;
    let rows = sink.store(&frame, &config.tables.details)?;
    Ok(DetailsSummary { rows, ..summary })
}

// ── Builders ────────────────────────────────────────────────────────

/// Sink for the configured backend.
pub fn build_sink(storage: &StorageConfig) -> Box<dyn TableSink> {
    match storage.backend {
        Backend::Sqlite => Box::new(SqliteSink::new(&storage.database)),
        Backend::Parquet => Box::new(ParquetSink::new(&storage.parquet_dir)),
    }
}

/// Registry in the configured database, filtered by `selection`.
pub fn build_registry(storage: &StorageConfig, selection: Selection) -> SqliteRegistry {
    SqliteRegistry::new(&storage.database, selection)
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Wall-clock time on the exchange's clock.
fn exchange_now(exchange: Exchange) -> NaiveDateTime {
    Utc::now().with_timezone(&exchange.utc_offset()).naive_local()
}

fn content_hash(batch: &FetchBatch) -> String {
    let mut hasher = blake3::Hasher::new();
    for record in batch.records() {
        match serde_json::to_vec(record) {
            Ok(bytes) => {
                hasher.update(&bytes);
            }
            Err(e) => warn!("cannot hash record for {}: {e}", record.symbol),
        }
    }
    hasher.finalize().to_hex().to_string()
}
