//! Property tests for the record normalizer.
//!
//! Uses proptest to verify:
//! 1. Row accounting: exactly the complete observations survive
//! 2. Symbols come out as bare tickers
//! 3. Every row of one call carries the same run timestamp
//! 4. Reduce-size narrows dtypes without changing values

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use proptest::prelude::*;
use stockdata_core::data::{Normalizer, PostProcess};
use stockdata_core::domain::{Exchange, QuoteRecord};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_symbol() -> impl Strategy<Value = String> {
    ("[A-Z]{1,8}", prop::bool::ANY, prop_oneof![Just(".NS"), Just(".BO")])
        .prop_map(|(t, caret, suffix)| format!("{}{t}{suffix}", if caret { "^" } else { "" }))
}

fn arb_price() -> impl Strategy<Value = Option<f64>> {
    prop::option::weighted(0.9, (10.0..5000.0_f64).prop_map(|p| (p * 100.0).round() / 100.0))
}

fn arb_volume() -> impl Strategy<Value = Option<f64>> {
    prop::option::weighted(0.9, (0u32..5_000_000).prop_map(f64::from))
}

fn arb_record() -> impl Strategy<Value = QuoteRecord> {
    (arb_symbol(), 0usize..30).prop_flat_map(|(symbol, n)| {
        (
            Just(symbol),
            prop::collection::vec(prop::option::weighted(0.95, 1_500_000_000i64..1_800_000_000), n),
            prop::collection::vec(arb_price(), n),
            prop::collection::vec(arb_price(), n),
            prop::collection::vec(arb_price(), n),
            prop::collection::vec(arb_price(), n),
            prop::collection::vec(arb_volume(), n),
        )
            .prop_map(|(symbol, timestamp, open, low, high, close, volume)| QuoteRecord {
                symbol,
                timestamp,
                open,
                low,
                high,
                close,
                volume,
            })
    })
}

fn stamped() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2020, 7, 20)
        .unwrap()
        .and_hms_opt(15, 45, 0)
        .unwrap()
}

fn complete_rows(records: &[QuoteRecord]) -> usize {
    records
        .iter()
        .map(|r| (0..r.len()).filter(|&i| r.observation(i).is_some()).count())
        .sum()
}

// ── 1. Row accounting ────────────────────────────────────────────────

proptest! {
    /// Rows with any missing field are dropped, all others kept.
    #[test]
    fn keeps_exactly_complete_rows(records in prop::collection::vec(arb_record(), 0..6)) {
        let table = Normalizer::new(Exchange::Nse).normalize(&records, stamped()).unwrap();
        let expected = complete_rows(&records);
        match table {
            None => prop_assert_eq!(expected, 0),
            Some(t) => {
                prop_assert_eq!(t.height(), expected);
                prop_assert_eq!(t.frame().column("volume").unwrap().null_count(), 0);
                prop_assert_eq!(t.frame().column("close").unwrap().null_count(), 0);
            }
        }
    }
}

// ── 2 + 3. Symbols and run timestamp ─────────────────────────────────

proptest! {
    /// Output symbols carry no suffix or caret, and runts is constant.
    #[test]
    fn bare_symbols_and_single_runts(records in prop::collection::vec(arb_record(), 1..6)) {
        let Some(table) = Normalizer::new(Exchange::Bse).normalize(&records, stamped()).unwrap() else {
            return Ok(());
        };
        let df = table.frame();
        for symbol in df.column("symbol").unwrap().str().unwrap().into_no_null_iter() {
            prop_assert!(!symbol.contains('.') && !symbol.contains('^'), "{}", symbol);
            prop_assert!(!symbol.is_empty());
        }
        let runts = df.column("runts").unwrap().str().unwrap();
        prop_assert!(runts.into_no_null_iter().all(|r| r == "Mon Jul-20-2020 15:45"));
    }
}

// ── 4. Reduce-size ───────────────────────────────────────────────────

proptest! {
    /// Narrowed tables hold the same values as the full-width ones.
    #[test]
    fn reduce_size_preserves_values(records in prop::collection::vec(arb_record(), 1..4)) {
        let wide = Normalizer::new(Exchange::Nse).normalize(&records, stamped()).unwrap();
        let narrow = Normalizer::new(Exchange::Nse)
            .with_post_process(&[PostProcess::ReduceSize])
            .normalize(&records, stamped())
            .unwrap();
        let (Some(wide), Some(narrow)) = (wide, narrow) else {
            return Ok(());
        };

        for name in ["volume", "year", "month", "day", "hour", "minute", "weekday"] {
            let a = wide.frame().column(name).unwrap().cast(&DataType::Int64).unwrap();
            let b = narrow.frame().column(name).unwrap().cast(&DataType::Int64).unwrap();
            prop_assert!(a.as_materialized_series().equals(b.as_materialized_series()), "{}", name);
        }

        let a = wide.frame().column("close").unwrap().f64().unwrap().clone();
        let b = narrow.frame().column("close").unwrap().cast(&DataType::Float64).unwrap();
        for (x, y) in a.into_no_null_iter().zip(b.f64().unwrap().into_no_null_iter()) {
            prop_assert!((x - y).abs() <= x.abs() * 1e-6, "{} vs {}", x, y);
        }
        prop_assert_eq!(narrow.frame().column("close").unwrap().dtype(), &DataType::Float32);
    }
}
