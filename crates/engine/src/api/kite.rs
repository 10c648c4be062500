//! Zerodha Kite Connect historical data client
//!
//! Needs an API key and a session access token. The NSE instrument list is
//! downloaded once per process to map trading symbols to instrument tokens.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::KiteCredentials;
use crate::error::{DataError, DataResult};
use crate::types::{Kline, WindowSpec};

const DEFAULT_BASE_URL: &str = "https://api.kite.trade";
const KITE_VERSION: &str = "3";
/// Kite reads `from`/`to` as exchange-local time (IST, UTC+05:30)
const IST_OFFSET_SECS: i64 = 5 * 3600 + 30 * 60;
const KITE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Kite Connect market data client
pub struct KiteClient {
    client: Client,
    base_url: String,
    credentials: KiteCredentials,
    instruments: OnceCell<HashMap<String, u64>>,
}

#[derive(Debug, Deserialize)]
struct InstrumentRow {
    instrument_token: u64,
    tradingsymbol: String,
}

#[derive(Debug, Deserialize)]
struct HistoricalResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    data: Option<HistoricalData>,
}

#[derive(Debug, Deserialize)]
struct HistoricalData {
    candles: Vec<Vec<serde_json::Value>>,
}

impl KiteClient {
    pub fn new(credentials: KiteCredentials) -> Self {
        Self::with_base_url(credentials, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(credentials: KiteCredentials, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
            credentials,
            instruments: OnceCell::new(),
        }
    }

    fn authorized(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header("X-Kite-Version", KITE_VERSION)
            .header(
                "Authorization",
                format!(
                    "token {}:{}",
                    self.credentials.api_key, self.credentials.access_token
                ),
            )
    }

    async fn instrument_map(&self) -> DataResult<&HashMap<String, u64>> {
        self.instruments
            .get_or_try_init(|| async {
                info!("Fetching Kite instruments map (NSE)");
                let url = format!("{}/instruments/NSE", self.base_url);
                let response = self.authorized(&url).send().await?;
                if !response.status().is_success() {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    return Err(DataError::Api(format!("Kite API error {}: {}", status, body)));
                }
                let body = response.text().await?;
                let map = parse_instruments(&body)?;
                info!(count = map.len(), "Kite instruments loaded");
                Ok(map)
            })
            .await
    }

    /// Fetch bars for an NSE symbol (`.NS` suffix optional); an empty vector means no data
    pub async fn get_history(&self, symbol: &str, window: &WindowSpec) -> DataResult<Vec<Kline>> {
        let clean = symbol.trim_end_matches(".NS");
        let token = *self
            .instrument_map()
            .await?
            .get(clean)
            .ok_or_else(|| DataError::SymbolNotFound {
                symbol: clean.to_string(),
            })?;

        let (interval, days) = kite_window(window);
        let (from, to) = kite_range(Utc::now(), days);

        let url = format!(
            "{}/instruments/historical/{}/{}",
            self.base_url, token, interval
        );

        debug!(symbol = clean, token, interval, days, "Fetching Kite history");

        let response = self
            .authorized(&url)
            .query(&[("from", from), ("to", to)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DataError::Api(format!("Kite API error {}: {}", status, body)));
        }

        let body: HistoricalResponse = response.json().await?;
        let klines = parse_candles(body, window)?;
        debug!(symbol = clean, count = klines.len(), "Fetched Kite history");
        Ok(klines)
    }
}

/// Kite interval name and look-back span in days for a window
fn kite_window(window: &WindowSpec) -> (&'static str, i64) {
    if window.interval == "5m" {
        // Kite caps intraday history per request
        return ("5minute", 5);
    }
    let days = match window.period.as_str() {
        "1y" => 365,
        "1mo" => 30,
        _ => 200,
    };
    ("day", days)
}

/// `from`/`to` query values covering `days` up to `now`, as IST wall-clock time
fn kite_range(now: DateTime<Utc>, days: i64) -> (String, String) {
    let to = now.naive_utc() + chrono::Duration::seconds(IST_OFFSET_SECS);
    let from = to - chrono::Duration::days(days);
    (
        from.format(KITE_TIME_FORMAT).to_string(),
        to.format(KITE_TIME_FORMAT).to_string(),
    )
}

fn parse_instruments(csv_body: &str) -> DataResult<HashMap<String, u64>> {
    let mut reader = csv::Reader::from_reader(csv_body.as_bytes());
    let mut map = HashMap::new();
    for row in reader.deserialize::<InstrumentRow>() {
        let row = row.map_err(|e| DataError::Api(format!("bad instruments row: {}", e)))?;
        map.insert(row.tradingsymbol, row.instrument_token);
    }
    Ok(map)
}

fn parse_candles(body: HistoricalResponse, window: &WindowSpec) -> DataResult<Vec<Kline>> {
    if body.status != "success" {
        return Err(DataError::Api(
            body.message.unwrap_or_else(|| format!("status {}", body.status)),
        ));
    }
    let Some(data) = body.data else {
        return Ok(Vec::new());
    };

    let bar_ms = window.interval_minutes().unwrap_or(24 * 60) as i64 * 60_000;
    let number = |v: &serde_json::Value| v.as_f64().and_then(Decimal::from_f64);

    let klines = data
        .candles
        .iter()
        .filter_map(|candle| {
            let ts = candle.first()?.as_str()?;
            let open_time = DateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%z")
                .ok()?
                .timestamp_millis();
            Some(Kline {
                open_time,
                open: number(candle.get(1)?)?,
                high: number(candle.get(2)?)?,
                low: number(candle.get(3)?)?,
                close: number(candle.get(4)?)?,
                volume: candle.get(5).and_then(number).unwrap_or(Decimal::ZERO),
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

    #[test]
    fn test_kite_window_mapping() {
        assert_eq!(kite_window(&WindowSpec::live()), ("5minute", 5));
        assert_eq!(kite_window(&WindowSpec::historical()), ("day", 200));
        let year = WindowSpec {
            period: "1y".into(),
            interval: "1d".into(),
        };
        assert_eq!(kite_window(&year), ("day", 365));
    }

    #[test]
    fn test_kite_range_uses_ist_wall_clock() {
        let now = DateTime::parse_from_rfc3339("2026-10-17T06:29:09Z")
            .unwrap()
            .with_timezone(&Utc);
        let (from, to) = kite_range(now, 5);
        assert_eq!(to, "2026-10-17 11:59:09");
        assert_eq!(from, "2026-10-12 11:59:09");

        // Late UTC evening is already the next day in India
        let now = DateTime::parse_from_rfc3339("2026-10-17T20:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let (_, to) = kite_range(now, 200);
        assert_eq!(to, "2026-10-18 01:30:00");
    }

    #[test]
    fn test_parse_instruments_csv() {
        let body = "instrument_token,exchange_token,tradingsymbol,name,last_price,expiry,strike,tick_size,lot_size,instrument_type,segment,exchange\n\
                    2953217,11536,TCS,TATA CONSULTANCY SERV LT,0,,0,0.05,1,EQ,NSE,NSE\n\
                    408065,1594,INFY,INFOSYS,0,,0,0.05,1,EQ,NSE,NSE\n";
        let map = parse_instruments(body).unwrap();
        assert_eq!(map.get("TCS"), Some(&2953217));
        assert_eq!(map.get("INFY"), Some(&408065));
    }

    #[test]
    fn test_parse_candles() {
        let body: HistoricalResponse = serde_json::from_str(
            r#"{"status":"success","data":{"candles":[
                ["2024-01-02T00:00:00+0530",3700.5,3750,3690,3740.25,1200345],
                ["garbage",1,2,3,4,5]
            ]}}"#,
        )
        .unwrap();
        let klines = parse_candles(body, &WindowSpec::historical()).unwrap();
        assert_eq!(klines.len(), 1);
        assert_eq!(klines[0].close, dec!(3740.25));
        assert_eq!(klines[0].open_time, 1_704_133_800_000);
    }

    #[test]
    fn test_parse_candles_error_status() {
        let body: HistoricalResponse =
            serde_json::from_str(r#"{"status":"error","message":"Invalid token"}"#).unwrap();
        let err = parse_candles(body, &WindowSpec::historical()).unwrap_err();
        assert!(err.to_string().contains("Invalid token"));
    }
}
