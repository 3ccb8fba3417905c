//! Intraday table contract: the columns a normalized table hands to a sink.
//!
//! Column kinds are checked by family rather than exact dtype, so a table that
//! went through the reduce-size step (Float32, Int8...) still validates.

use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Dtype family of a contract column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Text,
    Datetime,
    Date,
    Integer,
    Float,
}

impl ColumnKind {
    pub fn of(dtype: &DataType) -> Option<Self> {
        match dtype {
            DataType::String => Some(ColumnKind::Text),
            DataType::Datetime(_, _) => Some(ColumnKind::Datetime),
            DataType::Date => Some(ColumnKind::Date),
            dt if dt.is_integer() => Some(ColumnKind::Integer),
            dt if dt.is_float() => Some(ColumnKind::Float),
            _ => None,
        }
    }
}

/// A single field in the intraday contract.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaField {
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn field(name: &'static str, kind: ColumnKind) -> SchemaField {
    SchemaField { name, kind }
}

/// Columns of a normalized intraday table, in storage order.
pub const INTRADAY_SCHEMA: &[SchemaField] = &[
    field("symbol", ColumnKind::Text),
    field("datetime", ColumnKind::Datetime),
    field("date", ColumnKind::Date),
    field("year", ColumnKind::Integer),
    field("month", ColumnKind::Integer),
    field("day", ColumnKind::Integer),
    field("weekday", ColumnKind::Integer),
    field("hour", ColumnKind::Integer),
    field("minute", ColumnKind::Integer),
    field("open", ColumnKind::Float),
    field("low", ColumnKind::Float),
    field("high", ColumnKind::Float),
    field("close", ColumnKind::Float),
    field("volume", ColumnKind::Integer),
    field("runts", ColumnKind::Text),
];

/// Column names of the intraday contract, in storage order.
pub fn intraday_columns() -> impl Iterator<Item = &'static str> {
    INTRADAY_SCHEMA.iter().map(|f| f.name)
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("missing required column: {0}")]
    MissingColumn(String),

    #[error("column {column}: expected {expected:?}, got {actual}")]
    KindMismatch {
        column: String,
        expected: ColumnKind,
        actual: DataType,
    },

    #[error("unexpected column '{0}' (not in schema)")]
    UnexpectedColumn(String),

    #[error("column order differs from schema at position {0}")]
    OrderMismatch(usize),
}

/// Validate a DataFrame against the intraday contract: names, order and kinds.
pub fn validate_intraday(df: &DataFrame) -> Result<(), SchemaError> {
    for expected in INTRADAY_SCHEMA {
        let column = df
            .column(expected.name)
            .map_err(|_| SchemaError::MissingColumn(expected.name.to_string()))?;
        if ColumnKind::of(column.dtype()) != Some(expected.kind) {
            return Err(SchemaError::KindMismatch {
                column: expected.name.to_string(),
                expected: expected.kind,
                actual: column.dtype().clone(),
            });
        }
    }

    for name in df.get_column_names() {
        if !INTRADAY_SCHEMA.iter().any(|f| f.name == name.as_str()) {
            return Err(SchemaError::UnexpectedColumn(name.to_string()));
        }
    }

    for (i, (name, expected)) in df.get_column_names().iter().zip(INTRADAY_SCHEMA).enumerate() {
        if name.as_str() != expected.name {
            return Err(SchemaError::OrderMismatch(i));
        }
    }

    Ok(())
}
