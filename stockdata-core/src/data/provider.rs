//! Quote provider trait and structured error types.
//!
//! The QuoteProvider trait abstracts over quote sources so the fetch pool can
//! run against Yahoo Finance in production and a fixture in tests.

use crate::domain::{Observation, QuoteRecord, RequestWindow};
use thiserror::Error;

/// Why a single symbol produced no quote data.
///
/// None of these abort a batch: the fetch pool records the error against the
/// symbol and the normalizer never sees a record for it.
#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("HTTP {status} for {symbol}")]
    HttpStatus { status: u16, symbol: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("no quote data for {symbol}")]
    Empty { symbol: String },

    #[error("http client setup failed: {0}")]
    Client(String),
}

/// Source of per-symbol quote records.
///
/// Implementations must be callable from several worker threads at once and
/// must never panic on bad input: every failure is a `QuoteError`.
pub trait QuoteProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch the quote record for one symbol.
    fn fetch(&self, symbol: &str, window: RequestWindow) -> Result<QuoteRecord, QuoteError>;

    /// Last complete observation of the most recent range (current price lookup).
    fn latest_quote(&self, symbol: &str) -> Result<Observation, QuoteError> {
        let record = self.fetch(symbol, RequestWindow::MostRecent)?;
        record.latest().ok_or_else(|| QuoteError::Empty {
            symbol: record.symbol.clone(),
        })
    }
}
