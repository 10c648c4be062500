//! Yahoo Finance chart API client (no authentication required)

use reqwest::{Client, Url};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::error::{DataError, DataResult};
use crate::types::{Kline, WindowSpec};

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Yahoo Finance market data client
#[derive(Clone)]
pub struct YahooClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

/// Column-oriented OHLCV; any cell may be null on halted bars
#[derive(Debug, Default, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

impl Default for YahooClient {
    fn default() -> Self {
        Self::new()
    }
}

impl YahooClient {
    /// Create a new Yahoo client with the default base URL
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
        }
    }

    /// Fetch bars for `symbol` over the window; an empty vector means no data
    pub async fn get_chart(&self, symbol: &str, window: &WindowSpec) -> DataResult<Vec<Kline>> {
        let mut url = Url::parse(&self.base_url).map_err(|e| DataError::Api(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| DataError::Api(format!("invalid base URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(["v8", "finance", "chart", symbol]);
        url.query_pairs_mut()
            .append_pair("range", &window.period)
            .append_pair("interval", &window.interval)
            .append_pair("includePrePost", "false");

        debug!(symbol, period = %window.period, interval = %window.interval, "Fetching chart from Yahoo");

        let response = self.client.get(url).send().await?;

        // Yahoo answers unknown tickers with 404 and a regular chart error body
        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DataError::Api(format!("Yahoo API error {}: {}", status, body)));
        }

        let chart: ChartResponse = response.json().await?;
        let klines = parse_chart(symbol, chart, window)?;

        debug!(symbol, count = klines.len(), "Fetched chart");
        Ok(klines)
    }
}

fn parse_chart(symbol: &str, response: ChartResponse, window: &WindowSpec) -> DataResult<Vec<Kline>> {
    if let Some(err) = response.chart.error {
        return if err.code == "Not Found" {
            Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            })
        } else {
            Err(DataError::Api(format!("{}: {}", err.code, err.description)))
        };
    }

    let Some(data) = response.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(Vec::new());
    };
    let Some(timestamps) = data.timestamp else {
        return Ok(Vec::new());
    };
    let quote = data.indicators.quote.into_iter().next().unwrap_or_default();

    let bar_ms = window.interval_minutes().unwrap_or(24 * 60) as i64 * 60_000;
    let cell = |column: &[Option<f64>], i: usize| -> Option<Decimal> {
        column.get(i).copied().flatten().and_then(Decimal::from_f64)
    };

    let klines = timestamps
        .iter()
        .enumerate()
        .filter_map(|(i, &ts)| {
            // Bars without a close are non-trading placeholders
            let close = cell(&quote.close, i)?;
            let open_time = ts * 1000;
            Some(Kline {
                open_time,
                open: cell(&quote.open, i).unwrap_or(close),
                high: cell(&quote.high, i).unwrap_or(close),
                low: cell(&quote.low, i).unwrap_or(close),
                close,
                volume: cell(&quote.volume, i).unwrap_or(Decimal::ZERO),
                close_time: open_time + bar_ms - 1,
            })
        })
        .collect();

    Ok(klines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn parse(json: &str) -> DataResult<Vec<Kline>> {
        let response: ChartResponse = serde_json::from_str(json).unwrap();
        parse_chart("TCS.NS", response, &WindowSpec::historical())
    }

    #[test]
    fn test_parse_chart_skips_null_closes() {
        let klines = parse(
            r#"{"chart":{"result":[{"timestamp":[1700000000,1700086400,1700172800],
                "indicators":{"quote":[{"open":[10.0,null,12.0],"high":[11.0,null,13.0],
                "low":[9.0,null,11.5],"close":[10.5,null,12.5],"volume":[1000,null,1500]}]}}],
                "error":null}}"#,
        )
        .unwrap();

        assert_eq!(klines.len(), 2);
        assert_eq!(klines[0].open_time, 1_700_000_000_000);
        assert_eq!(klines[0].close_time, 1_700_000_000_000 + 86_400_000 - 1);
        assert_eq!(klines[1].close, dec!(12.5));
        assert_eq!(klines[1].volume, dec!(1500));
    }

    #[test]
    fn test_parse_chart_not_found() {
        let err = parse(
            r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, DataError::SymbolNotFound { .. }));
    }

    #[test]
    fn test_parse_chart_without_timestamps_is_empty() {
        let klines = parse(
            r#"{"chart":{"result":[{"indicators":{"quote":[{}]}}],"error":null}}"#,
        )
        .unwrap();
        assert!(klines.is_empty());
    }
}
