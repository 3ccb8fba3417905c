//! Integration tests across the data layer: registry, normalizer, sinks.
//!
//! Tests:
//! 1. A seeded registry resolves suffixed symbols in insertion order
//! 2. A normalized table lands in SQLite with the contract's columns
//! 3. Reduced tables round-trip through Parquet with narrowed dtypes

use chrono::NaiveDate;
use polars::prelude::*;
use rusqlite::Connection;
use std::path::Path;
use stockdata_core::data::schema::intraday_columns;
use stockdata_core::data::{
    Normalizer, ParquetSink, PostProcess, Selection, SqliteRegistry, SqliteSink, SymbolSource,
    TableSink,
};
use stockdata_core::domain::{Exchange, QuoteRecord};

// ── Helpers ──────────────────────────────────────────────────────────

fn record(symbol: &str, points: usize) -> QuoteRecord {
    let t0 = 1_595_216_700;
    QuoteRecord {
        symbol: symbol.into(),
        timestamp: (0..points).map(|i| Some(t0 + 300 * i as i64)).collect(),
        open: (0..points).map(|i| Some(1900.0 + i as f64)).collect(),
        low: (0..points).map(|i| Some(1890.0 + i as f64)).collect(),
        high: (0..points).map(|i| Some(1910.0 + i as f64)).collect(),
        close: (0..points).map(|i| Some(1905.0 + i as f64)).collect(),
        volume: (0..points).map(|i| Some(1000.0 * (i + 1) as f64)).collect(),
    }
}

fn stamped() -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2020, 7, 20)
        .unwrap()
        .and_hms_opt(15, 45, 0)
        .unwrap()
}

fn seed_registry(dir: &Path) -> SqliteRegistry {
    let csv = dir.join("symbols.csv");
    std::fs::write(
        &csv,
        "symbol,innse,inbse,innifty200\nRELIANCE,1,1,1\nTCS,1,0,1\nIDEA,0,1,0\n",
    )
    .unwrap();
    let registry = SqliteRegistry::new(dir.join("store.db"), Selection::Listed);
    registry.import_csv(&csv).unwrap();
    registry
}

// ── 1. Registry ──────────────────────────────────────────────────────

#[test]
fn registry_resolves_per_exchange() {
    let dir = tempfile::tempdir().unwrap();
    let registry = seed_registry(dir.path());

    assert_eq!(
        registry.resolve(Exchange::Nse, 0).unwrap(),
        vec!["RELIANCE.NS", "TCS.NS"]
    );
    assert_eq!(
        registry.resolve(Exchange::Bse, 0).unwrap(),
        vec!["RELIANCE.BO", "IDEA.BO"]
    );

    let baskets = SqliteRegistry::new(
        registry.path(),
        Selection::IndexBaskets(vec!["innifty200".into()]),
    );
    assert_eq!(baskets.resolve(Exchange::Nse, 1).unwrap(), vec!["RELIANCE.NS"]);
}

// ── 2. SQLite ────────────────────────────────────────────────────────

#[test]
fn normalized_table_lands_in_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("store.db");
    let table = Normalizer::new(Exchange::Nse)
        .normalize(&[record("RELIANCE.NS", 3), record("TCS.NS", 2)], stamped())
        .unwrap()
        .unwrap();

    let sink = SqliteSink::new(&db);
    assert_eq!(sink.store(table.frame(), "nseintraday").unwrap(), 5);

    let conn = Connection::open(&db).unwrap();
    let mut stmt = conn
        .prepare("SELECT name FROM pragma_table_info('nseintraday')")
        .unwrap();
    let columns: Vec<String> = stmt
        .query_map([], |r| r.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(columns, intraday_columns().collect::<Vec<_>>());

    let (datetime, volume): (String, i64) = conn
        .query_row(
            "SELECT datetime, volume FROM nseintraday WHERE symbol = 'TCS' ORDER BY datetime DESC",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert_eq!(datetime, "2020-07-20 09:20:00");
    assert_eq!(volume, 2000);
}

// ── 3. Parquet ───────────────────────────────────────────────────────

#[test]
fn reduced_table_roundtrips_through_parquet() {
    let dir = tempfile::tempdir().unwrap();
    let table = Normalizer::new(Exchange::Bse)
        .with_post_process(&[PostProcess::ReduceSize])
        .normalize(&[record("RELIANCE.BO", 4)], stamped())
        .unwrap()
        .unwrap();

    let sink = ParquetSink::new(dir.path());
    sink.store(table.frame(), "bseintraday").unwrap();

    let file = std::fs::read_dir(sink.table_dir("bseintraday"))
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();
    let back = ParquetReader::new(std::fs::File::open(file).unwrap())
        .finish()
        .unwrap();
    assert_eq!(back.height(), 4);
    assert_eq!(back.column("open").unwrap().dtype(), &DataType::Float32);
    assert_eq!(back.column("minute").unwrap().dtype(), &DataType::Int8);
    assert_eq!(back.column("volume").unwrap().dtype(), &DataType::Int16);
}
