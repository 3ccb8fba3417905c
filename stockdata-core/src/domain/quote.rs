use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::exchange::Exchange;

/// One provider response for one symbol: parallel observation sequences.
///
/// All sequences of a well-formed record share the length of `timestamp`.
/// Individual observations may be null; such rows are dropped downstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub symbol: String,
    /// Epoch seconds, one per observation.
    pub timestamp: Vec<Option<i64>>,
    pub open: Vec<Option<f64>>,
    pub low: Vec<Option<f64>>,
    pub high: Vec<Option<f64>>,
    pub close: Vec<Option<f64>>,
    /// Provider volume. Kept as float so integral floats like `100000.0` survive parsing.
    pub volume: Vec<Option<f64>>,
}

/// A single fully-populated observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub timestamp: i64,
    pub open: f64,
    pub low: f64,
    pub high: f64,
    pub close: f64,
    pub volume: f64,
}

impl QuoteRecord {
    /// Number of observations (length of the timestamp sequence).
    pub fn len(&self) -> usize {
        self.timestamp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamp.is_empty()
    }

    /// True when every sequence is aligned with `timestamp`.
    pub fn is_well_formed(&self) -> bool {
        let n = self.len();
        self.open.len() == n
            && self.low.len() == n
            && self.high.len() == n
            && self.close.len() == n
            && self.volume.len() == n
    }

    /// The observation at `i`, if every field is present.
    pub fn observation(&self, i: usize) -> Option<Observation> {
        Some(Observation {
            timestamp: self.timestamp.get(i).copied().flatten()?,
            open: self.open.get(i).copied().flatten()?,
            low: self.low.get(i).copied().flatten()?,
            high: self.high.get(i).copied().flatten()?,
            close: self.close.get(i).copied().flatten()?,
            volume: self.volume.get(i).copied().flatten()?,
        })
    }

    /// Most recent complete observation.
    pub fn latest(&self) -> Option<Observation> {
        (0..self.len()).rev().find_map(|i| self.observation(i))
    }
}

/// Time range requested from the quote provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestWindow {
    /// The provider's most recent one-day range.
    MostRecent,
    /// A calendar day, as epoch seconds `[start, end)`.
    Day { start: i64, end: i64 },
}

impl RequestWindow {
    /// Window covering `date` on the exchange's wall clock.
    pub fn for_day(date: NaiveDate, exchange: Exchange) -> Self {
        let midnight = date.and_hms_opt(0, 0, 0).expect("midnight is a valid time");
        let start =
            midnight.and_utc().timestamp() - i64::from(exchange.utc_offset().local_minus_utc());
        RequestWindow::Day {
            start,
            end: start + 86_400,
        }
    }
}
