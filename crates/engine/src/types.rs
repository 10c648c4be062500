//! Shared types for the scanner: bars, sampling windows, signals and result records

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single candlestick (OHLCV)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: i64,
}

/// Sampling window handed to a market data provider.
///
/// `period` and `interval` use the Yahoo Finance vocabulary (`6mo`, `1d`,
/// `5m`, ...); providers with a different vocabulary translate them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub period: String,
    pub interval: String,
}

impl WindowSpec {
    /// Six months of daily bars
    pub fn historical() -> Self {
        Self {
            period: "6mo".to_string(),
            interval: "1d".to_string(),
        }
    }

    /// Today's 5-minute bars
    pub fn live() -> Self {
        Self {
            period: "1d".to_string(),
            interval: "5m".to_string(),
        }
    }

    pub fn for_mode(live: bool) -> Self {
        if live {
            Self::live()
        } else {
            Self::historical()
        }
    }

    /// Bar length in minutes, `None` for an interval we cannot interpret
    pub fn interval_minutes(&self) -> Option<u64> {
        let s = self.interval.trim();
        let split = s.find(|c: char| !c.is_ascii_digit())?;
        let (count, unit) = s.split_at(split);
        let count: u64 = count.parse().ok()?;
        let minutes = match unit {
            "m" => 1,
            "h" => 60,
            "d" => 24 * 60,
            "wk" => 7 * 24 * 60,
            _ => return None,
        };
        Some(count * minutes)
    }

    /// Annualisation factor for per-bar returns (365-day year)
    pub fn periods_per_year(&self) -> Option<f64> {
        let minutes = self.interval_minutes()? as f64;
        if minutes <= 0.0 {
            return None;
        }
        Some(365.0 * 24.0 * 60.0 / minutes)
    }
}

/// Categorical signal on the most recent bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Buy,
    Sell,
    Neutral,
}

/// Combined verdict across both strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    #[serde(rename = "Strong Buy")]
    StrongBuy,
    #[serde(rename = "Short Term Buy")]
    ShortTermBuy,
    #[serde(rename = "Long Term Buy")]
    LongTermBuy,
    Avoid,
}

impl Recommendation {
    pub fn label(&self) -> &'static str {
        match self {
            Recommendation::StrongBuy => "Strong Buy",
            Recommendation::ShortTermBuy => "Short Term Buy",
            Recommendation::LongTermBuy => "Long Term Buy",
            Recommendation::Avoid => "Avoid",
        }
    }
}

/// Backtest metrics for one strategy. Every field is absent rather than non-finite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyMetrics {
    #[serde(with = "rust_decimal::serde::float_option")]
    pub return_pct: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub sharpe: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub max_dd_pct: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub win_rate_pct: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyReport {
    #[serde(flatten)]
    pub metrics: StrategyMetrics,
    pub signal: Signal,
}

/// Output of the signal engine for one price series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    #[serde(with = "rust_decimal::serde::float_option")]
    pub last_price: Option<Decimal>,
    pub momentum: StrategyReport,
    pub mean_reversion: StrategyReport,
    pub recommendation: Recommendation,
}

/// One scan record per symbol. Numbers serialise as JSON numbers or `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolResult {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub last_price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub momentum_return: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub mean_rev_return: Option<Decimal>,
}

impl SymbolResult {
    /// Null-filled record for a symbol without usable data
    pub fn degraded(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            last_price: None,
            momentum_return: None,
            mean_rev_return: None,
        }
    }

    pub fn from_evaluation(symbol: impl Into<String>, evaluation: &Evaluation) -> Self {
        Self {
            symbol: symbol.into(),
            last_price: evaluation.last_price,
            momentum_return: evaluation.momentum.metrics.return_pct.map(|v| v.round_dp(2)),
            mean_rev_return: evaluation
                .mean_reversion
                .metrics
                .return_pct
                .map(|v| v.round_dp(2)),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.last_price.is_none()
    }

    /// True if either strategy returned at least `threshold` percent
    pub fn meets_min_return(&self, threshold: Decimal) -> bool {
        self.momentum_return.is_some_and(|r| r >= threshold)
            || self.mean_rev_return.is_some_and(|r| r >= threshold)
    }
}

/// One-shot analysis record (full metrics plus recommendation)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolAnalysis {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub last_price: Option<Decimal>,
    pub momentum: StrategyReport,
    pub mean_reversion: StrategyReport,
    pub recommendation: Recommendation,
}

impl SymbolAnalysis {
    pub fn new(symbol: impl Into<String>, evaluation: Evaluation) -> Self {
        Self {
            symbol: symbol.into(),
            last_price: evaluation.last_price,
            momentum: evaluation.momentum,
            mean_reversion: evaluation.mean_reversion,
            recommendation: evaluation.recommendation,
        }
    }
}

/// Convert a float metric to a `Decimal`, dropping NaN, infinities and
/// values outside the `Decimal` range.
pub fn finite_decimal(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_f64(value)
}
