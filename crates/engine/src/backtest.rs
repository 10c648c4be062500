//! Signal-driven portfolio simulation
//!
//! Long-only, all-in/all-out at the bar close, no fees. Metrics are raw
//! floats; callers normalise them (NaN means "undefined", e.g. a win rate
//! with no trades).

use tracing::debug;

use crate::strategies::SignalSeries;

/// Starting cash for every simulation
pub const INITIAL_CASH: f64 = 100_000.0;

/// A round trip. An open trade is marked to the last close.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub entry_bar: usize,
    pub exit_bar: usize,
    pub entry_price: f64,
    pub exit_price: f64,
    pub pnl: f64,
    pub open: bool,
}

/// Open position state during simulation
struct OpenPosition {
    entry_bar: usize,
    entry_price: f64,
    shares: f64,
}

/// Result of one simulation
#[derive(Debug, Clone)]
pub struct Portfolio {
    pub initial_cash: f64,
    pub equity_curve: Vec<f64>,
    pub trades: Vec<Trade>,
}

impl Portfolio {
    /// Simulate entries/exits against close prices.
    ///
    /// An entry and an exit on the same bar cancel each other out.
    pub fn from_signals(closes: &[f64], signals: &SignalSeries, initial_cash: f64) -> Self {
        let mut cash = initial_cash;
        let mut position: Option<OpenPosition> = None;
        let mut trades = Vec::new();
        let mut equity_curve = Vec::with_capacity(closes.len());

        for (i, &close) in closes.iter().enumerate() {
            let entry = signals.entries.get(i).copied().unwrap_or(false);
            let exit = signals.exits.get(i).copied().unwrap_or(false);

            if entry && !exit && position.is_none() && close > 0.0 {
                position = Some(OpenPosition {
                    entry_bar: i,
                    entry_price: close,
                    shares: cash / close,
                });
                cash = 0.0;
            } else if exit && !entry {
                if let Some(pos) = position.take() {
                    cash = pos.shares * close;
                    trades.push(Trade {
                        entry_bar: pos.entry_bar,
                        exit_bar: i,
                        entry_price: pos.entry_price,
                        exit_price: close,
                        pnl: (close - pos.entry_price) * pos.shares,
                        open: false,
                    });
                }
            }

            let held = position.as_ref().map(|p| p.shares * close).unwrap_or(0.0);
            equity_curve.push(cash + held);
        }

        let open = position.is_some();
        if let (Some(pos), Some(&last)) = (position, closes.last()) {
            trades.push(Trade {
                entry_bar: pos.entry_bar,
                exit_bar: closes.len() - 1,
                entry_price: pos.entry_price,
                exit_price: last,
                pnl: (last - pos.entry_price) * pos.shares,
                open: true,
            });
        }

        debug!(
            bars = closes.len(),
            trades = trades.len(),
            open,
            "Simulation complete"
        );

        Self {
            initial_cash,
            equity_curve,
            trades,
        }
    }

    pub fn final_value(&self) -> f64 {
        self.equity_curve.last().copied().unwrap_or(self.initial_cash)
    }

    /// Final value over initial cash, minus one
    pub fn total_return(&self) -> f64 {
        self.final_value() / self.initial_cash - 1.0
    }

    /// Per-bar returns; the first bar is measured against the initial cash
    pub fn returns(&self) -> Vec<f64> {
        let mut prev = self.initial_cash;
        self.equity_curve
            .iter()
            .map(|&value| {
                let r = value / prev - 1.0;
                prev = value;
                r
            })
            .collect()
    }

    /// Annualised Sharpe ratio of per-bar returns (risk-free rate 0)
    pub fn sharpe_ratio(&self, periods_per_year: f64) -> f64 {
        let returns = self.returns();
        if returns.len() < 2 {
            return f64::NAN;
        }
        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
        mean / variance.sqrt() * periods_per_year.sqrt()
    }

    /// Deepest peak-to-trough decline as a non-positive fraction
    pub fn max_drawdown(&self) -> f64 {
        let mut peak = self.initial_cash;
        let mut worst = 0.0_f64;
        for &value in &self.equity_curve {
            if value > peak {
                peak = value;
            }
            if peak > 0.0 {
                worst = worst.min(value / peak - 1.0);
            }
        }
        worst
    }

    /// Share of trades with positive PnL, open trade included; NaN without trades
    pub fn win_rate(&self) -> f64 {
        if self.trades.is_empty() {
            return f64::NAN;
        }
        let winners = self.trades.iter().filter(|t| t.pnl > 0.0).count();
        winners as f64 / self.trades.len() as f64
    }
}
