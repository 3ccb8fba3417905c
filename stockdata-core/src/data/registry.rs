//! Symbol registry: which symbols a run processes for an exchange.
//!
//! The registry is a `symbols` table with one row per bare ticker and 0/1
//! membership flags (listed on a venue, member of an index basket). A
//! `Selection` picks the flags a run filters on; resolved symbols come back
//! already suffixed for the exchange.

use super::sql::{quote_identifier, validate_identifier, InvalidIdentifier};
use crate::domain::Exchange;
use log::info;
use rusqlite::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the registry table.
pub const SYMBOLS_TABLE: &str = "symbols";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    InvalidIdentifier(#[from] InvalidIdentifier),

    #[error("selection names no index baskets")]
    EmptySelection,

    #[error("registry CSV has no 'symbol' column")]
    MissingSymbolColumn,
}

/// Selection predicate over the registry's membership flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// Symbols flagged as listed on the exchange (`innse`, `inbse`).
    Listed,
    /// Symbols flagged as members of any of the named baskets.
    IndexBaskets(Vec<String>),
}

impl Selection {
    /// SQL predicate for this selection on `exchange`.
    pub fn predicate(&self, exchange: Exchange) -> Result<String, RegistryError> {
        match self {
            Selection::Listed => Ok(format!(
                "{} = 1",
                quote_identifier(exchange.listing_flag())
            )),
            Selection::IndexBaskets(flags) => {
                if flags.is_empty() {
                    return Err(RegistryError::EmptySelection);
                }
                let terms = flags
                    .iter()
                    .map(|f| validate_identifier(f).map(|f| format!("{} = 1", quote_identifier(f))))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(terms.join(" OR "))
            }
        }
    }

    /// Check flag names without touching a database.
    pub fn validate(&self) -> Result<(), RegistryError> {
        self.predicate(Exchange::Nse).map(|_| ())
    }
}

/// Resolves the ordered symbol list for a run.
pub trait SymbolSource: Send + Sync {
    /// Exchange-suffixed symbols for `exchange`. `limit <= 0` means no cap.
    fn resolve(&self, exchange: Exchange, limit: i64) -> Result<Vec<String>, RegistryError>;

    /// Membership filter applied by `resolve`; `None` for unfiltered sources.
    fn selection(&self) -> Option<&Selection> {
        None
    }
}

/// Registry stored in the SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteRegistry {
    path: PathBuf,
    selection: Selection,
}

impl SqliteRegistry {
    pub fn new(path: impl Into<PathBuf>, selection: Selection) -> Self {
        Self {
            path: path.into(),
            selection,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the registry table with the contents of a CSV file.
    ///
    /// The CSV must have a `symbol` column; every other column is a 0/1 flag
    /// (`1`, `true`, `y` and `yes` count as set). Returns the number of rows
    /// loaded.
    pub fn import_csv(&self, csv_path: &Path) -> Result<usize, RegistryError> {
        let mut reader = csv::Reader::from_path(csv_path)?;
        let headers = reader.headers()?.clone();

        let symbol_idx = headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case("symbol"))
            .ok_or(RegistryError::MissingSymbolColumn)?;

        let flags: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != symbol_idx)
            .map(|(i, h)| {
                let name = h.trim().to_lowercase();
                validate_identifier(&name)?;
                Ok((i, name))
            })
            .collect::<Result<_, RegistryError>>()?;

        let mut conn = Connection::open(&self.path)?;
        let tx = conn.transaction()?;

        let mut ddl = format!(
            "DROP TABLE IF EXISTS {table};\nCREATE TABLE {table} (symbol TEXT NOT NULL",
            table = quote_identifier(SYMBOLS_TABLE)
        );
        for (_, flag) in &flags {
            ddl.push_str(&format!(", {} INTEGER NOT NULL DEFAULT 0", quote_identifier(flag)));
        }
        ddl.push_str(");");
        tx.execute_batch(&ddl)?;

        let columns: Vec<String> = std::iter::once("symbol".to_string())
            .chain(flags.iter().map(|(_, f)| quote_identifier(f)))
            .collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(SYMBOLS_TABLE),
            columns.join(", "),
            placeholders.join(", ")
        );

        let mut count = 0;
        {
            let mut stmt = tx.prepare(&insert)?;
            for row in reader.records() {
                let row = row?;
                let symbol = row.get(symbol_idx).unwrap_or("").trim();
                if symbol.is_empty() {
                    continue;
                }
                let mut values: Vec<rusqlite::types::Value> =
                    vec![rusqlite::types::Value::Text(symbol.to_uppercase())];
                for (i, _) in &flags {
                    values.push(rusqlite::types::Value::Integer(i64::from(is_set(
                        row.get(*i).unwrap_or(""),
                    ))));
                }
                stmt.execute(params_from_iter(values.iter()))?;
                count += 1;
            }
        }
        tx.commit()?;

        info!(
            "imported {count} symbols with flags [{}] into {}",
            flags.iter().map(|(_, f)| f.as_str()).collect::<Vec<_>>().join(", "),
            self.path.display()
        );
        Ok(count)
    }
}

fn is_set(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "y" | "yes"
    )
}

impl SymbolSource for SqliteRegistry {
    fn resolve(&self, exchange: Exchange, limit: i64) -> Result<Vec<String>, RegistryError> {
        let predicate = self.selection.predicate(exchange)?;
        let sql = format!(
            "SELECT symbol FROM {} WHERE {predicate} GROUP BY symbol ORDER BY MIN(rowid) LIMIT ?1",
            quote_identifier(SYMBOLS_TABLE)
        );
        // SQLite treats a negative LIMIT as unbounded.
        let sql_limit = if limit > 0 { limit } else { -1 };

        let conn = Connection::open(&self.path)?;
        let mut stmt = conn.prepare(&sql)?;
        let tickers = stmt
            .query_map([sql_limit], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(tickers.iter().map(|t| exchange.qualify(t)).collect())
    }

    fn selection(&self) -> Option<&Selection> {
        Some(&self.selection)
    }
}

/// Fixed in-memory ticker list. The selection predicate does not apply.
#[derive(Debug, Clone, Default)]
pub struct StaticSymbols {
    tickers: Vec<String>,
}

impl StaticSymbols {
    pub fn new<I, S>(tickers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tickers: tickers.into_iter().map(Into::into).collect(),
        }
    }
}

impl SymbolSource for StaticSymbols {
    fn resolve(&self, exchange: Exchange, limit: i64) -> Result<Vec<String>, RegistryError> {
        let mut symbols: Vec<String> = self.tickers.iter().map(|t| exchange.qualify(t)).collect();
        if limit > 0 {
            symbols.truncate(limit as usize);
        }
        Ok(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn registry_csv(dir: &Path, rows: usize) -> PathBuf {
        let path = dir.join("symbols.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "symbol,innse,inbse,innifty200,inniftymidcap100").unwrap();
        for i in 0..rows {
            // every symbol on NSE, odd ones on BSE, first ten in nifty200,
            // 5..15 in midcap (overlapping 5..10)
            let nifty = u8::from(i < 10);
            let midcap = u8::from((5..15).contains(&i));
            writeln!(f, "SYM{i:02},1,{},{nifty},{midcap}", i % 2).unwrap();
        }
        path
    }

    fn seeded(rows: usize, selection: Selection) -> (tempfile::TempDir, SqliteRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let csv = registry_csv(dir.path(), rows);
        let registry = SqliteRegistry::new(dir.path().join("store.db"), selection);
        assert_eq!(registry.import_csv(&csv).unwrap(), rows);
        (dir, registry)
    }

    #[test]
    fn limit_caps_and_zero_means_all() {
        let (_dir, registry) = seeded(50, Selection::Listed);
        assert_eq!(registry.resolve(Exchange::Nse, 5).unwrap().len(), 5);
        assert_eq!(registry.resolve(Exchange::Nse, 0).unwrap().len(), 50);
        assert_eq!(registry.resolve(Exchange::Nse, -3).unwrap().len(), 50);
    }

    #[test]
    fn listed_selection_uses_exchange_flag_and_suffix() {
        let (_dir, registry) = seeded(10, Selection::Listed);
        let bse = registry.resolve(Exchange::Bse, 0).unwrap();
        assert_eq!(bse, vec!["SYM01.BO", "SYM03.BO", "SYM05.BO", "SYM07.BO", "SYM09.BO"]);
        let nse = registry.resolve(Exchange::Nse, 2).unwrap();
        assert_eq!(nse, vec!["SYM00.NS", "SYM01.NS"]);
    }

    #[test]
    fn basket_selection_is_distinct_and_ordered() {
        let selection =
            Selection::IndexBaskets(vec!["innifty200".into(), "inniftymidcap100".into()]);
        let (_dir, registry) = seeded(20, selection);
        let symbols = registry.resolve(Exchange::Nse, 0).unwrap();
        assert_eq!(symbols.len(), 15);
        assert_eq!(symbols.first().unwrap(), "SYM00.NS");
        assert_eq!(symbols.last().unwrap(), "SYM14.NS");
    }

    #[test]
    fn invalid_basket_name_is_rejected() {
        let selection = Selection::IndexBaskets(vec!["innifty200 OR 1=1".into()]);
        assert!(matches!(
            selection.validate(),
            Err(RegistryError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            Selection::IndexBaskets(vec![]).validate(),
            Err(RegistryError::EmptySelection)
        ));
    }

    #[test]
    fn csv_without_symbol_column_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "ticker,innse\nABC,1\n").unwrap();
        let registry = SqliteRegistry::new(dir.path().join("store.db"), Selection::Listed);
        assert!(matches!(
            registry.import_csv(&path),
            Err(RegistryError::MissingSymbolColumn)
        ));
    }

    #[test]
    fn static_symbols_qualify_and_limit() {
        let source = StaticSymbols::new(["A", "B", "C"]);
        assert_eq!(source.resolve(Exchange::Nse, 2).unwrap(), vec!["A.NS", "B.NS"]);
        assert_eq!(source.resolve(Exchange::Bse, 0).unwrap().len(), 3);
    }

    #[test]
    fn only_the_registry_reports_a_selection() {
        let baskets = Selection::IndexBaskets(vec!["innifty200".into()]);
        let registry = SqliteRegistry::new("unused.db", baskets.clone());
        assert_eq!(registry.selection(), Some(&baskets));
        assert_eq!(StaticSymbols::new(["A"]).selection(), None);
    }

    #[test]
    fn selection_deserializes_from_config_forms() {
        let listed: Selection = serde_json::from_str(r#""listed""#).unwrap();
        assert_eq!(listed, Selection::Listed);
        let baskets: Selection =
            serde_json::from_str(r#"{"index_baskets":["innifty200"]}"#).unwrap();
        assert_eq!(baskets, Selection::IndexBaskets(vec!["innifty200".into()]));
    }
}
