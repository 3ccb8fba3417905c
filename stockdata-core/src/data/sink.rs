//! Table sinks: where normalized tables are appended.
//!
//! - `SqliteSink`: one table per name in the store database, created on first
//!   write with column types mapped from the frame's dtypes
//! - `ParquetSink`: one file per write at
//!   `{dir}/{table}/{unix_millis}-{pid}-{seq}.parquet`, written to `.tmp` and
//!   renamed into place

use super::sql::{quote_identifier, validate_identifier, InvalidIdentifier};
use chrono::{DateTime, NaiveDate, Utc};
use log::info;
use polars::prelude::*;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("polars: {0}")]
    Polars(#[from] PolarsError),

    #[error("parquet write failed: {0}")]
    Parquet(String),

    #[error(transparent)]
    InvalidIdentifier(#[from] InvalidIdentifier),
}

/// Append-only destination for tables. Duplicate rows are not detected.
pub trait TableSink: Send + Sync {
    fn name(&self) -> &str;

    /// Append `df` to `table_name`; returns rows written.
    fn store(&self, df: &DataFrame, table_name: &str) -> Result<usize, StoreError>;
}

// ── SQLite ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SqliteSink {
    path: PathBuf,
}

impl SqliteSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// SQLite column affinity for a polars dtype.
pub fn sql_type(dtype: &DataType) -> &'static str {
    if dtype.is_integer() || matches!(dtype, DataType::Boolean) {
        "INTEGER"
    } else if dtype.is_float() {
        "REAL"
    } else {
        "TEXT"
    }
}

fn sql_value(value: AnyValue<'_>) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Integer(i64::from(b)),
        AnyValue::UInt8(v) => Value::Integer(v.into()),
        AnyValue::UInt16(v) => Value::Integer(v.into()),
        AnyValue::Int8(v) => Value::Integer(v.into()),
        AnyValue::Int16(v) => Value::Integer(v.into()),
        AnyValue::Int32(v) => Value::Integer(v.into()),
        AnyValue::Int64(v) => Value::Integer(v),
        AnyValue::UInt32(v) => Value::Integer(v.into()),
        AnyValue::UInt64(v) => i64::try_from(v).map_or(Value::Real(v as f64), Value::Integer),
        AnyValue::Float32(v) => Value::Real(v.into()),
        AnyValue::Float64(v) => Value::Real(v),
        AnyValue::String(s) => Value::Text(s.to_string()),
        AnyValue::StringOwned(s) => Value::Text(s.to_string()),
        AnyValue::Date(days) => NaiveDate::from_num_days_from_ce_opt(days + 719_163)
            .map_or(Value::Null, |d| Value::Text(d.format("%Y-%m-%d").to_string())),
        AnyValue::Datetime(v, unit, _) => {
            let dt = match unit {
                TimeUnit::Milliseconds => DateTime::from_timestamp_millis(v),
                TimeUnit::Microseconds => DateTime::from_timestamp_micros(v),
                TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(v)),
            };
            dt.map_or(Value::Null, |dt| {
                Value::Text(dt.naive_utc().format("%Y-%m-%d %H:%M:%S").to_string())
            })
        }
        other => Value::Text(other.to_string()),
    }
}

impl TableSink for SqliteSink {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn store(&self, df: &DataFrame, table_name: &str) -> Result<usize, StoreError> {
        let table = quote_identifier(validate_identifier(table_name)?);
        let columns = df.get_columns();

        let definitions: Vec<String> = columns
            .iter()
            .map(|c| format!("{} {}", quote_identifier(c.name()), sql_type(c.dtype())))
            .collect();
        let names: Vec<String> = columns.iter().map(|c| quote_identifier(c.name())).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();

        let mut conn = Connection::open(&self.path)?;
        let tx = conn.transaction()?;
        tx.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} ({});",
            definitions.join(", ")
        ))?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                names.join(", "),
                placeholders.join(", ")
            ))?;
            for row in 0..df.height() {
                let values = columns
                    .iter()
                    .map(|c| c.get(row).map(sql_value))
                    .collect::<PolarsResult<Vec<_>>>()?;
                stmt.execute(params_from_iter(values))?;
            }
        }
        tx.commit()?;

        info!(
            "stored {} rows into {table_name} ({})",
            df.height(),
            self.path.display()
        );
        Ok(df.height())
    }
}

// ── Parquet ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ParquetSink {
    dir: PathBuf,
}

impl ParquetSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding every file written for `table_name`.
    pub fn table_dir(&self, table_name: &str) -> PathBuf {
        self.dir.join(table_name)
    }
}

/// Per-process write counter; keeps file names unique within one millisecond.
static PARQUET_SEQ: AtomicU64 = AtomicU64::new(0);

fn parquet_file_name() -> String {
    format!(
        "{}-{}-{}.parquet",
        Utc::now().timestamp_millis(),
        std::process::id(),
        PARQUET_SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

impl TableSink for ParquetSink {
    fn name(&self) -> &str {
        "parquet"
    }

    fn store(&self, df: &DataFrame, table_name: &str) -> Result<usize, StoreError> {
        validate_identifier(table_name)?;
        let table_dir = self.table_dir(table_name);
        fs::create_dir_all(&table_dir)
            .map_err(|e| StoreError::Parquet(format!("create {}: {e}", table_dir.display())))?;

        let path = table_dir.join(parquet_file_name());
        let tmp_path = path.with_extension("parquet.tmp");
        write_parquet(df, &tmp_path)?;

        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::Parquet(format!("atomic rename failed: {e}"))
        })?;

        info!("wrote {} rows to {}", df.height(), path.display());
        Ok(df.height())
    }
}

fn write_parquet(df: &DataFrame, path: &Path) -> Result<(), StoreError> {
    let file = fs::File::create(path)
        .map_err(|e| StoreError::Parquet(format!("create {}: {e}", path.display())))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| StoreError::Parquet(format!("write parquet: {e}")))?;
    Ok(())
}
