//! Record normalizer: provider records in, one intraday table out.
//!
//! Pipeline per call:
//! 1. Explode every record positionally into rows
//! 2. Drop rows with any missing (or NaN) timestamp, price or volume, or a
//!    volume outside the Int64 range
//! 3. Rewrite symbols to bare tickers
//! 4. Derive exchange-local time features
//! 5. Cast volume to Int64 and stamp every row with the run timestamp
//! 6. Apply the profile's post-processing steps

use crate::domain::{Exchange, QuoteRecord};
use chrono::{DateTime, Datelike, NaiveDateTime, Timelike};
use log::debug;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Format of the `runts` column, e.g. `Mon Jul-20-2020 15:45`.
pub const RUNTS_FORMAT: &str = "%a %b-%d-%Y %H:%M";

/// Days from 0001-01-01 (CE day 1) to 1970-01-01.
const UNIX_EPOCH_CE_DAYS: i32 = 719_163;

const REQUIRED: [&str; 6] = ["timestamp", "open", "low", "high", "close", "volume"];

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("polars: {0}")]
    Polars(#[from] PolarsError),

    #[error("timestamp {0} is outside the representable range")]
    TimestampOutOfRange(i64),
}

/// Optional step applied after the column contract is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostProcess {
    /// Floats to Float32, integers to the narrowest signed type holding their range.
    ReduceSize,
}

/// A normalized intraday table. Never empty.
#[derive(Debug, Clone)]
pub struct QuoteTable {
    df: DataFrame,
}

impl QuoteTable {
    pub fn frame(&self) -> &DataFrame {
        &self.df
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }
}

/// Builds intraday tables for one exchange.
#[derive(Debug, Clone)]
pub struct Normalizer {
    exchange: Exchange,
    post_process: Vec<PostProcess>,
}

impl Normalizer {
    pub fn new(exchange: Exchange) -> Self {
        Self {
            exchange,
            post_process: Vec::new(),
        }
    }

    pub fn with_post_process(mut self, steps: &[PostProcess]) -> Self {
        self.post_process = steps.to_vec();
        self
    }

    /// Normalize `records` into one table. `Ok(None)` means no usable rows.
    ///
    /// `stamped_at` is the run's wall-clock time; every row carries the same
    /// `runts` value.
    pub fn normalize<'a, I>(
        &self,
        records: I,
        stamped_at: NaiveDateTime,
    ) -> Result<Option<QuoteTable>, NormalizeError>
    where
        I: IntoIterator<Item = &'a QuoteRecord>,
    {
        let merged = merge_records(records)?;
        let before = merged.height();
        let complete = drop_incomplete(merged)?;
        debug!(
            "normalize: {before} merged rows, {} complete",
            complete.height()
        );
        if complete.height() == 0 {
            return Ok(None);
        }

        let mut df = self.build_contract(&complete, stamped_at)?;
        for step in &self.post_process {
            df = match step {
                PostProcess::ReduceSize => reduce_size(&df)?,
            };
        }
        Ok(Some(QuoteTable { df }))
    }

    fn build_contract(
        &self,
        complete: &DataFrame,
        stamped_at: NaiveDateTime,
    ) -> Result<DataFrame, NormalizeError> {
        let n = complete.height();
        let offset = self.exchange.utc_offset();

        let symbols: Vec<String> = complete
            .column("symbol")?
            .str()?
            .into_iter()
            .map(|s| bare_ticker(s.unwrap_or_default()))
            .collect();

        let mut datetime_ms = Vec::with_capacity(n);
        let mut date_days = Vec::with_capacity(n);
        let mut year = Vec::with_capacity(n);
        let mut month = Vec::with_capacity(n);
        let mut day = Vec::with_capacity(n);
        let mut weekday = Vec::with_capacity(n);
        let mut hour = Vec::with_capacity(n);
        let mut minute = Vec::with_capacity(n);

        for ts in complete.column("timestamp")?.i64()?.into_iter().flatten() {
            let local = DateTime::from_timestamp(ts, 0)
                .ok_or(NormalizeError::TimestampOutOfRange(ts))?
                .with_timezone(&offset)
                .naive_local();
            datetime_ms.push(local.and_utc().timestamp_millis());
            date_days.push(local.date().num_days_from_ce() - UNIX_EPOCH_CE_DAYS);
            year.push(local.year());
            month.push(local.month() as i32);
            day.push(local.day() as i32);
            weekday.push(local.weekday().num_days_from_monday() as i32);
            hour.push(local.hour() as i32);
            minute.push(local.minute() as i32);
        }

        let runts = stamped_at.format(RUNTS_FORMAT).to_string();

        let df = DataFrame::new(vec![
            Column::new("symbol".into(), symbols),
            Column::new("datetime".into(), datetime_ms)
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?,
            Column::new("date".into(), date_days).cast(&DataType::Date)?,
            Column::new("year".into(), year),
            Column::new("month".into(), month),
            Column::new("day".into(), day),
            Column::new("weekday".into(), weekday),
            Column::new("hour".into(), hour),
            Column::new("minute".into(), minute),
            complete.column("open")?.clone(),
            complete.column("low")?.clone(),
            complete.column("high")?.clone(),
            complete.column("close")?.clone(),
            complete.column("volume")?.cast(&DataType::Int64)?,
            Column::new("runts".into(), vec![runts; n]),
        ])?;
        Ok(df)
    }
}

/// Strip the exchange suffix and any index caret: `^NSEI.NS` -> `NSEI`.
pub fn bare_ticker(symbol: &str) -> String {
    symbol
        .split('.')
        .next()
        .unwrap_or_default()
        .replace('^', "")
}

// ── Helpers ─────────────────────────────────────────────────────────

fn finite(v: Option<f64>) -> Option<f64> {
    v.filter(|x| !x.is_nan())
}

/// A volume that survives the Int64 cast; anything else counts as missing.
fn integral_volume(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite() && *x >= i64::MIN as f64 && *x < i64::MAX as f64)
}

/// Concatenate records positionally into one nullable frame.
fn merge_records<'a, I>(records: I) -> Result<DataFrame, NormalizeError>
where
    I: IntoIterator<Item = &'a QuoteRecord>,
{
    let mut symbol = Vec::new();
    let mut timestamp = Vec::new();
    let mut open = Vec::new();
    let mut low = Vec::new();
    let mut high = Vec::new();
    let mut close = Vec::new();
    let mut volume = Vec::new();

    for record in records.into_iter().filter(|r| !r.is_empty()) {
        for i in 0..record.len() {
            symbol.push(record.symbol.clone());
            timestamp.push(record.timestamp.get(i).copied().flatten());
            open.push(finite(record.open.get(i).copied().flatten()));
            low.push(finite(record.low.get(i).copied().flatten()));
            high.push(finite(record.high.get(i).copied().flatten()));
            close.push(finite(record.close.get(i).copied().flatten()));
            volume.push(integral_volume(record.volume.get(i).copied().flatten()));
        }
    }

    Ok(DataFrame::new(vec![
        Column::new("symbol".into(), symbol),
        Column::new("timestamp".into(), timestamp),
        Column::new("open".into(), open),
        Column::new("low".into(), low),
        Column::new("high".into(), high),
        Column::new("close".into(), close),
        Column::new("volume".into(), volume),
    ])?)
}

fn drop_incomplete(df: DataFrame) -> Result<DataFrame, NormalizeError> {
    if df.height() == 0 {
        return Ok(df);
    }
    let keep = REQUIRED
        .iter()
        .map(|c| col(*c).is_not_null())
        .reduce(|acc, e| acc.and(e))
        .unwrap_or_else(|| lit(true));
    Ok(df.lazy().filter(keep).collect()?)
}

/// Narrow every numeric column without changing its values.
pub fn reduce_size(df: &DataFrame) -> Result<DataFrame, NormalizeError> {
    let columns = df
        .get_columns()
        .iter()
        .map(reduce_column)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(DataFrame::new(columns)?)
}

fn reduce_column(column: &Column) -> Result<Column, NormalizeError> {
    let dtype = column.dtype();
    if dtype.is_float() {
        return Ok(column.cast(&DataType::Float32)?);
    }
    if !dtype.is_integer() {
        return Ok(column.clone());
    }

    let wide = column.cast(&DataType::Int64)?;
    let values = wide.i64()?;
    let (Some(lo), Some(hi)) = (values.min(), values.max()) else {
        return Ok(column.clone());
    };
    Ok(column.cast(&narrowest_int(lo, hi))?)
}

fn narrowest_int(lo: i64, hi: i64) -> DataType {
    let fits = |min: i64, max: i64| lo >= min && hi <= max;
    if fits(i8::MIN.into(), i8::MAX.into()) {
        DataType::Int8
    } else if fits(i16::MIN.into(), i16::MAX.into()) {
        DataType::Int16
    } else if fits(i32::MIN.into(), i32::MAX.into()) {
        DataType::Int32
    } else {
        DataType::Int64
    }
}
