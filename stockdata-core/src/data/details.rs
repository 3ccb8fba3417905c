//! Security details: company profile and fundamentals scraped from the quote page.
//!
//! The quote page embeds its state as a JavaScript assignment
//! (`root.App.main = {...}`); the `QuoteSummaryStore` inside it holds one
//! object per domain (`price`, `summaryProfile`, `financialData`, ...).
//! Values come wrapped as `{"raw": 1.5, "fmt": "1.50"}` and are flattened to
//! the raw value.

use super::normalize::bare_ticker;
use super::provider::QuoteError;
use super::yahoo::ProviderSettings;
use log::{debug, warn};
use polars::prelude::*;
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

const STATE_MARKER: &str = "root.App.main =";
const STORE_MARKER: &str = "QuoteSummaryStore";
const STORE_POINTER: &str = "/context/dispatcher/stores/QuoteSummaryStore";

static NULL: Value = Value::Null;

#[derive(Debug, Error)]
pub enum DetailsError {
    #[error(transparent)]
    Request(#[from] QuoteError),

    #[error("quote page for {symbol} has no QuoteSummaryStore")]
    MissingStore { symbol: String },

    #[error("embedded quote state is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("field list line {line}: {reason}")]
    FieldList { line: usize, reason: String },

    #[error("cannot read field list {path}: {reason}")]
    FieldFile { path: String, reason: String },

    #[error("polars: {0}")]
    Polars(#[from] PolarsError),
}

/// One `(domain, key)` entry of the field list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailField {
    pub domain: String,
    pub key: String,
}

impl DetailField {
    pub fn new(domain: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            key: key.into(),
        }
    }

    /// Output column name: the key, lowercased.
    pub fn column(&self) -> String {
        self.key.to_lowercase()
    }
}

/// Output column order. Columns not listed here follow in field-list order.
pub const CANONICAL_COLUMNS: &[&str] = &[
    "shortname",
    "longname",
    "sector",
    "industry",
    "profitmargins",
    "grossmargins",
    "revenuegrowth",
    "operatingmargins",
    "grossprofits",
    "earningsgrowth",
    "returnonassets",
    "returnonequity",
    "totalcash",
    "totaldebt",
    "totalrevenue",
    "totalcashpershare",
    "revenuepershare",
    "regularmarketchange",
    "marketcap",
    "dividendyield",
    "regularmarketchangepercent",
    "enterprisetorevenue",
    "sharesoutstanding",
    "bookvalue",
    "netincometocommon",
    "pricetobook",
    "floatshares",
    "enterprisevalue",
];

const BUILTIN_FIELDS: &str = "\
[price]
shortName
longName
regularMarketChange
marketCap
regularMarketChangePercent

[summaryProfile]
sector
industry

[financialData]
profitMargins
grossMargins
revenueGrowth
operatingMargins
grossProfits
earningsGrowth
returnOnAssets
returnOnEquity
totalCash
totalDebt
totalRevenue
totalCashPerShare
revenuePerShare

[summaryDetail]
dividendYield

[defaultKeyStatistics]
enterpriseToRevenue
sharesOutstanding
bookValue
netIncomeToCommon
priceToBook
floatShares
enterpriseValue
";

/// The list of fields pulled for each symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailFields {
    fields: Vec<DetailField>,
}

impl DetailFields {
    /// Parse a sectioned field list: `[domain]` header lines, then one key per line.
    pub fn parse(text: &str) -> Result<Self, DetailsError> {
        let mut domain: Option<String> = None;
        let mut fields = Vec::new();

        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(header) = line.strip_prefix('[') {
                let name = header.trim_end_matches(']').trim();
                if name.is_empty() {
                    return Err(DetailsError::FieldList {
                        line: i + 1,
                        reason: "empty [domain] header".into(),
                    });
                }
                domain = Some(name.to_string());
                continue;
            }
            let Some(domain) = &domain else {
                return Err(DetailsError::FieldList {
                    line: i + 1,
                    reason: format!("key '{line}' appears before any [domain] header"),
                });
            };
            fields.push(DetailField::new(domain.clone(), line));
        }

        Ok(Self { fields })
    }

    pub fn from_file(path: &Path) -> Result<Self, DetailsError> {
        let text = std::fs::read_to_string(path).map_err(|e| DetailsError::FieldFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&text)
    }

    pub fn builtin() -> Self {
        Self::parse(BUILTIN_FIELDS).unwrap_or_else(|_| Self { fields: Vec::new() })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields in output column order, one per distinct column name.
    pub fn ordered(&self) -> Vec<&DetailField> {
        let mut ordered: Vec<&DetailField> = Vec::with_capacity(self.fields.len());
        for name in CANONICAL_COLUMNS {
            if let Some(f) = self.fields.iter().find(|f| f.column() == *name) {
                ordered.push(f);
            }
        }
        for f in &self.fields {
            if !ordered.iter().any(|o| o.column() == f.column()) {
                ordered.push(f);
            }
        }
        ordered
    }
}

impl Default for DetailFields {
    fn default() -> Self {
        Self::builtin()
    }
}

// ── Page parsing ────────────────────────────────────────────────────

/// Pull the `QuoteSummaryStore` object out of a quote page.
pub fn extract_summary_store(symbol: &str, html: &str) -> Result<Value, DetailsError> {
    let missing = || DetailsError::MissingStore {
        symbol: symbol.to_string(),
    };
    let (_, state) = html.split_once(STATE_MARKER).ok_or_else(missing)?;
    let state = state.split("(this)").next().unwrap_or(state);
    let state = state.split(";\n}").next().unwrap_or(state).trim();

    let root: Value = serde_json::from_str(state)?;
    root.pointer(STORE_POINTER).cloned().ok_or_else(missing)
}

/// Replace `{"raw": x, ...}` wrappers by `x` and empty objects by null.
pub fn flatten_raw(value: Value) -> Value {
    match value {
        Value::Object(map) if map.is_empty() => Value::Null,
        Value::Object(mut map) if map.contains_key("raw") => {
            flatten_raw(map.remove("raw").unwrap_or(Value::Null))
        }
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, flatten_raw(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(flatten_raw).collect()),
        other => other,
    }
}

/// Value of one field in a flattened store; null when absent.
pub fn field_value<'a>(store: &'a Value, field: &DetailField) -> &'a Value {
    store
        .get(&field.domain)
        .and_then(|d| d.get(&field.key))
        .unwrap_or(&NULL)
}

// ── Provider ────────────────────────────────────────────────────────

/// Source of flattened `QuoteSummaryStore` objects.
pub trait DetailsProvider: Send + Sync {
    fn details(&self, symbol: &str) -> Result<Value, DetailsError>;
}

/// Scrapes the Yahoo Finance quote page.
pub struct SecurityDetailsClient {
    client: reqwest::blocking::Client,
    quote_url: String,
}

impl SecurityDetailsClient {
    pub fn new(settings: &ProviderSettings) -> Result<Self, DetailsError> {
        Ok(Self {
            client: settings.http_client()?,
            quote_url: settings.quote_url.trim_end_matches('/').to_string(),
        })
    }

    fn page(&self, symbol: &str) -> Result<String, DetailsError> {
        let url = format!("{}/{symbol}", self.quote_url);
        let resp = self.client.get(&url).send().map_err(|e| {
            if e.is_timeout() {
                QuoteError::Timeout(e.to_string())
            } else {
                QuoteError::NetworkUnreachable(e.to_string())
            }
        })?;
        if !resp.status().is_success() {
            return Err(QuoteError::HttpStatus {
                status: resp.status().as_u16(),
                symbol: symbol.to_string(),
            }
            .into());
        }
        resp.text()
            .map_err(|e| QuoteError::ResponseFormatChanged(e.to_string()).into())
    }
}

impl DetailsProvider for SecurityDetailsClient {
    fn details(&self, symbol: &str) -> Result<Value, DetailsError> {
        let mut html = self.page(symbol)?;
        if !html.contains(STORE_MARKER) {
            debug!("{symbol}: quote page without {STORE_MARKER}, fetching again");
            html = self.page(symbol)?;
        }
        if !html.contains(STORE_MARKER) {
            return Err(DetailsError::MissingStore {
                symbol: symbol.to_string(),
            });
        }
        Ok(flatten_raw(extract_summary_store(symbol, &html)?))
    }
}

// ── Table ───────────────────────────────────────────────────────────

/// Build the details table: one row per symbol, `symbol` first.
///
/// A symbol whose lookup failed keeps its row with every field null. A column
/// whose present values are all numbers is Float64, otherwise String.
pub fn details_frame(
    results: &[(String, Result<Value, DetailsError>)],
    fields: &DetailFields,
) -> Result<DataFrame, DetailsError> {
    let mut columns = Vec::with_capacity(fields.len() + 1);
    columns.push(Column::new(
        "symbol".into(),
        results
            .iter()
            .map(|(s, _)| bare_ticker(s))
            .collect::<Vec<_>>(),
    ));

    for field in fields.ordered() {
        let values: Vec<&Value> = results
            .iter()
            .map(|(_, r)| match r {
                Ok(store) => field_value(store, field),
                Err(_) => &NULL,
            })
            .collect();
        columns.push(value_column(&field.column(), &values));
    }

    for (symbol, result) in results {
        if let Err(e) = result {
            warn!("details for {symbol} unavailable: {e}");
        }
    }

    Ok(DataFrame::new(columns)?)
}

fn value_column(name: &str, values: &[&Value]) -> Column {
    let numeric = values.iter().all(|v| v.is_null() || v.is_number());
    if numeric {
        let floats: Vec<Option<f64>> = values.iter().map(|v| v.as_f64()).collect();
        Column::new(name.into(), floats)
    } else {
        let text: Vec<Option<String>> = values
            .iter()
            .map(|v| match v {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
            .collect();
        Column::new(name.into(), text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PAGE: &str = r#"<script>
(function (root) {
root.App.main = {"context":{"dispatcher":{"stores":{"QuoteSummaryStore":{"price":{"shortName":"Reliance Industries","marketCap":{"raw":12500000000000,"fmt":"12.5T"},"regularMarketChange":{}},"summaryProfile":{"sector":"Energy","industry":"Oil & Gas"},"financialData":{"profitMargins":{"raw":0.08,"fmt":"8.00%"}}}}}}};
}(this));
</script>"#;

    #[test]
    fn builtin_list_covers_canonical_columns() {
        let fields = DetailFields::builtin();
        assert_eq!(fields.len(), CANONICAL_COLUMNS.len());
        let names: Vec<String> = fields.ordered().iter().map(|f| f.column()).collect();
        assert_eq!(names, CANONICAL_COLUMNS);
    }

    #[test]
    fn parse_field_list_sections() {
        let fields = DetailFields::parse("[price]\nshortName\n\n[extra]\nbeta\n").unwrap();
        let ordered = fields.ordered();
        assert_eq!(ordered[0], &DetailField::new("price", "shortName"));
        assert_eq!(ordered[1], &DetailField::new("extra", "beta"));
    }

    #[test]
    fn key_before_header_is_rejected() {
        assert!(matches!(
            DetailFields::parse("shortName\n[price]\n"),
            Err(DetailsError::FieldList { line: 1, .. })
        ));
    }

    #[test]
    fn extracts_and_flattens_store() {
        let store = flatten_raw(extract_summary_store("RELIANCE.NS", PAGE).unwrap());
        assert_eq!(store["price"]["shortName"], json!("Reliance Industries"));
        assert_eq!(store["price"]["marketCap"], json!(12500000000000u64));
        assert_eq!(store["price"]["regularMarketChange"], Value::Null);
        assert_eq!(store["financialData"]["profitMargins"], json!(0.08));
    }

    #[test]
    fn page_without_state_is_missing_store() {
        assert!(matches!(
            extract_summary_store("X.NS", "<html></html>"),
            Err(DetailsError::MissingStore { .. })
        ));
    }

    #[test]
    fn flatten_handles_nesting() {
        let v = json!({"a": [{"raw": 1, "fmt": "1"}, {}], "b": {"c": {"raw": "x"}}});
        assert_eq!(flatten_raw(v), json!({"a": [1, null], "b": {"c": "x"}}));
    }

    #[test]
    fn frame_has_typed_columns_and_null_rows() {
        let store = flatten_raw(extract_summary_store("RELIANCE.NS", PAGE).unwrap());
        let results = vec![
            ("RELIANCE.NS".to_string(), Ok(store)),
            (
                "TCS.NS".to_string(),
                Err(DetailsError::MissingStore {
                    symbol: "TCS.NS".into(),
                }),
            ),
        ];
        let df = details_frame(&results, &DetailFields::builtin()).unwrap();

        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), CANONICAL_COLUMNS.len() + 1);
        assert_eq!(df.get_column_names()[0].as_str(), "symbol");
        assert_eq!(df.column("symbol").unwrap().str().unwrap().get(1), Some("TCS"));
        assert_eq!(df.column("sector").unwrap().dtype(), &DataType::String);
        assert_eq!(df.column("marketcap").unwrap().dtype(), &DataType::Float64);
        assert_eq!(
            df.column("marketcap").unwrap().f64().unwrap().get(0),
            Some(12_500_000_000_000.0)
        );
        assert_eq!(df.column("sector").unwrap().str().unwrap().get(1), None);
        assert_eq!(df.column("totaldebt").unwrap().null_count(), 2);
    }
}
