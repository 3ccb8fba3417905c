//! Yahoo Finance quote provider.
//!
//! Fetches the most recent trading range from Yahoo's v8 chart API and parses
//! it into a QuoteRecord. Retries only on connection errors; malformed or empty
//! responses are reported immediately.
//!
//! Yahoo Finance has no official API and is subject to unannounced format changes.

use super::provider::{QuoteError, QuoteProvider};
use crate::domain::{QuoteRecord, RequestWindow};
use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP settings shared by the chart client and the security-details client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Chart endpoint; the symbol is appended as a path segment.
    pub base_url: String,
    /// Quote page endpoint used for security details.
    pub quote_url: String,
    /// Bar interval requested from the chart endpoint.
    pub interval: String,
    /// Extra attempts after a connection error.
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: "https://query1.finance.yahoo.com/v8/finance/chart".into(),
            quote_url: "https://finance.yahoo.com/quote".into(),
            interval: "1d".into(),
            max_retries: 1,
            retry_base_delay_ms: 500,
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".into(),
        }
    }
}

impl ProviderSettings {
    /// Build a blocking HTTP client with this configuration's timeouts.
    pub fn http_client(&self) -> Result<reqwest::blocking::Client, QuoteError> {
        reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .timeout(Duration::from_secs(self.request_timeout_secs))
            .user_agent(self.user_agent.as_str())
            .build()
            .map_err(|e| QuoteError::Client(e.to_string()))
    }
}

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<Option<i64>>>,
    indicators: Option<Indicators>,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteData>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteData {
    open: Option<Vec<Option<f64>>>,
    low: Option<Vec<Option<f64>>>,
    high: Option<Vec<Option<f64>>>,
    close: Option<Vec<Option<f64>>>,
    volume: Option<Vec<Option<f64>>>,
}

impl QuoteData {
    fn is_blank(&self) -> bool {
        self.open.is_none()
            && self.low.is_none()
            && self.high.is_none()
            && self.close.is_none()
            && self.volume.is_none()
    }
}

/// Parse a raw chart API body into a QuoteRecord.
pub fn parse_chart(symbol: &str, body: &str) -> Result<QuoteRecord, QuoteError> {
    let resp: ChartResponse = serde_json::from_str(body).map_err(|e| {
        QuoteError::ResponseFormatChanged(format!("failed to parse response for {symbol}: {e}"))
    })?;
    parse_response(symbol, resp)
}

fn parse_response(symbol: &str, resp: ChartResponse) -> Result<QuoteRecord, QuoteError> {
    let result = resp.chart.result.ok_or_else(|| match resp.chart.error {
        Some(err) if err.code == "Not Found" => QuoteError::SymbolNotFound {
            symbol: symbol.to_string(),
        },
        Some(err) => QuoteError::ResponseFormatChanged(format!(
            "{}: {}",
            err.code,
            err.description.unwrap_or_default()
        )),
        None => QuoteError::ResponseFormatChanged("empty result with no error".into()),
    })?;

    let data = result
        .into_iter()
        .next()
        .ok_or_else(|| QuoteError::ResponseFormatChanged("result array is empty".into()))?;

    let indicators = data
        .indicators
        .ok_or_else(|| QuoteError::ResponseFormatChanged("no indicators".into()))?;

    let quote = indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| QuoteError::ResponseFormatChanged("no quote data".into()))?;

    if quote.is_blank() {
        return Err(QuoteError::Empty {
            symbol: symbol.to_string(),
        });
    }

    let timestamp = data.timestamp.unwrap_or_default();
    if timestamp.is_empty() {
        return Err(QuoteError::Empty {
            symbol: symbol.to_string(),
        });
    }

    let record = QuoteRecord {
        symbol: data
            .meta
            .and_then(|m| m.symbol)
            .unwrap_or_else(|| symbol.to_string()),
        timestamp,
        open: quote.open.unwrap_or_default(),
        low: quote.low.unwrap_or_default(),
        high: quote.high.unwrap_or_default(),
        close: quote.close.unwrap_or_default(),
        volume: quote.volume.unwrap_or_default(),
    };

    if !record.is_well_formed() {
        return Err(QuoteError::ResponseFormatChanged(format!(
            "misaligned quote sequences for {symbol}"
        )));
    }

    Ok(record)
}

/// Yahoo Finance chart provider.
pub struct YahooChartClient {
    client: reqwest::blocking::Client,
    base_url: String,
    interval: String,
    max_retries: u32,
    base_delay: Duration,
}

impl YahooChartClient {
    pub fn new(settings: &ProviderSettings) -> Result<Self, QuoteError> {
        Ok(Self {
            client: settings.http_client()?,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            interval: settings.interval.clone(),
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.retry_base_delay_ms),
        })
    }

    /// Build the chart API URL for a symbol.
    fn chart_url(&self, symbol: &str) -> String {
        format!("{}/{symbol}", self.base_url)
    }

    /// Query parameters for a request window.
    fn query(&self, window: RequestWindow) -> Vec<(&'static str, String)> {
        let mut params = vec![("interval", self.interval.clone())];
        match window {
            RequestWindow::MostRecent => params.push(("range", "1d".into())),
            RequestWindow::Day { start, end } => {
                params.push(("period1", start.to_string()));
                params.push(("period2", end.to_string()));
            }
        }
        params
    }

    /// Execute the request, retrying on connection errors only.
    fn fetch_with_retry(
        &self,
        symbol: &str,
        window: RequestWindow,
    ) -> Result<QuoteRecord, QuoteError> {
        let url = self.chart_url(symbol);
        let query = self.query(window);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                debug!("retrying {symbol} in {delay:?} (attempt {})", attempt + 1);
                std::thread::sleep(delay);
            }

            match self.client.get(&url).query(&query).send() {
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().map_err(|e| {
                        QuoteError::ResponseFormatChanged(format!(
                            "failed to read body for {symbol}: {e}"
                        ))
                    })?;

                    if !status.is_success() {
                        // Yahoo reports unknown symbols as 404 with a chart error body.
                        return match parse_chart(symbol, &body) {
                            Err(e @ QuoteError::SymbolNotFound { .. }) => Err(e),
                            _ => Err(QuoteError::HttpStatus {
                                status: status.as_u16(),
                                symbol: symbol.to_string(),
                            }),
                        };
                    }

                    return parse_chart(symbol, &body);
                }
                Err(e) if e.is_connect() => {
                    last_error = Some(QuoteError::NetworkUnreachable(e.to_string()));
                }
                Err(e) if e.is_timeout() => return Err(QuoteError::Timeout(e.to_string())),
                Err(e) => return Err(QuoteError::NetworkUnreachable(e.to_string())),
            }
        }

        Err(last_error
            .unwrap_or_else(|| QuoteError::NetworkUnreachable("max retries exceeded".into())))
    }
}

impl QuoteProvider for YahooChartClient {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch(&self, symbol: &str, window: RequestWindow) -> Result<QuoteRecord, QuoteError> {
        let symbol = symbol.trim().to_uppercase();
        self.fetch_with_retry(&symbol, window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHART_OK: &str = r#"{
        "chart": {
            "result": [{
                "meta": {"symbol": "RELIANCE.NS", "currency": "INR"},
                "timestamp": [1595216700, 1595217000],
                "indicators": {
                    "quote": [{
                        "open": [1900.5, 1905.0],
                        "low": [1895.0, null],
                        "high": [1910.0, 1908.0],
                        "close": [1904.0, 1906.0],
                        "volume": [100000, 1500]
                    }]
                }
            }],
            "error": null
        }
    }"#;

    #[test]
    fn parses_well_formed_chart() {
        let record = parse_chart("RELIANCE.NS", CHART_OK).unwrap();
        assert_eq!(record.symbol, "RELIANCE.NS");
        assert_eq!(record.len(), 2);
        assert_eq!(record.open[0], Some(1900.5));
        assert_eq!(record.low[1], None);
        assert_eq!(record.volume[0], Some(100000.0));
        assert!(record.is_well_formed());
    }

    #[test]
    fn not_found_error_maps_to_symbol_not_found() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let err = parse_chart("NOPE.NS", body).unwrap_err();
        assert!(matches!(err, QuoteError::SymbolNotFound { .. }));
    }

    #[test]
    fn empty_quote_object_is_empty() {
        let body = r#"{"chart":{"result":[{"meta":{"symbol":"X.NS"},"timestamp":[1],"indicators":{"quote":[{}]}}],"error":null}}"#;
        let err = parse_chart("X.NS", body).unwrap_err();
        assert!(matches!(err, QuoteError::Empty { .. }));
    }

    #[test]
    fn missing_indicators_is_format_change() {
        let body = r#"{"chart":{"result":[{"meta":{"symbol":"X.NS"},"timestamp":[1]}],"error":null}}"#;
        let err = parse_chart("X.NS", body).unwrap_err();
        assert!(matches!(err, QuoteError::ResponseFormatChanged(_)));
    }

    #[test]
    fn missing_timestamps_is_empty() {
        let body = r#"{"chart":{"result":[{"meta":{"symbol":"X.NS"},"indicators":{"quote":[{"open":[],"low":[],"high":[],"close":[],"volume":[]}]}}],"error":null}}"#;
        let err = parse_chart("X.NS", body).unwrap_err();
        assert!(matches!(err, QuoteError::Empty { .. }));
    }

    #[test]
    fn misaligned_sequences_are_rejected() {
        let body = r#"{"chart":{"result":[{"meta":{"symbol":"X.NS"},"timestamp":[1,2],"indicators":{"quote":[{"open":[1.0],"low":[1.0,1.0],"high":[1.0,1.0],"close":[1.0,1.0],"volume":[1,1]}]}}],"error":null}}"#;
        let err = parse_chart("X.NS", body).unwrap_err();
        assert!(matches!(err, QuoteError::ResponseFormatChanged(_)));
    }

    #[test]
    fn garbage_body_is_format_change() {
        let err = parse_chart("X.NS", "<html>rate limited</html>").unwrap_err();
        assert!(matches!(err, QuoteError::ResponseFormatChanged(_)));
    }

    #[test]
    fn query_uses_range_or_period() {
        let client = YahooChartClient::new(&ProviderSettings::default()).unwrap();
        let latest = client.query(RequestWindow::MostRecent);
        assert_eq!(latest, vec![("interval", "1d".to_string()), ("range", "1d".to_string())]);

        let day = client.query(RequestWindow::Day { start: 10, end: 20 });
        assert_eq!(
            day,
            vec![
                ("interval", "1d".to_string()),
                ("period1", "10".to_string()),
                ("period2", "20".to_string()),
            ]
        );
    }

    #[test]
    fn chart_url_appends_symbol() {
        let settings = ProviderSettings {
            base_url: "https://example.test/chart/".into(),
            ..ProviderSettings::default()
        };
        let client = YahooChartClient::new(&settings).unwrap();
        assert_eq!(client.chart_url("TCS.NS"), "https://example.test/chart/TCS.NS");
    }
}
