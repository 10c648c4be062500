//! Rule-based entry/exit signal streams
//!
//! Two strategies over close prices:
//! - Momentum: fast SMA above slow SMA enters, below exits
//! - Mean reversion: RSI under the oversold level enters, above the exit level exits
//!
//! Bars inside an indicator's warm-up window emit neither entries nor exits.

use anyhow::Result;
use ta::indicators::{RelativeStrengthIndex, SimpleMovingAverage};
use ta::Next;

use crate::types::Signal;

/// Periods and thresholds for both strategies
#[derive(Debug, Clone)]
pub struct StrategyParams {
    pub fast_period: usize,
    pub slow_period: usize,
    pub rsi_period: usize,
    /// RSI below this enters (default: 30)
    pub rsi_entry: f64,
    /// RSI above this exits (default: 55)
    pub rsi_exit: f64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            fast_period: 10,
            slow_period: 30,
            rsi_period: 14,
            rsi_entry: 30.0,
            rsi_exit: 55.0,
        }
    }
}

/// Aligned boolean entry/exit streams, one element per bar
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalSeries {
    pub entries: Vec<bool>,
    pub exits: Vec<bool>,
}

impl SignalSeries {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Signal on the last bar: an entry wins over an exit
    pub fn current_signal(&self) -> Signal {
        match (self.entries.last(), self.exits.last()) {
            (Some(true), _) => Signal::Buy,
            (_, Some(true)) => Signal::Sell,
            _ => Signal::Neutral,
        }
    }
}

/// Moving-average crossover signals
pub fn momentum_signals(closes: &[f64], params: &StrategyParams) -> Result<SignalSeries> {
    let mut fast = SimpleMovingAverage::new(params.fast_period)
        .map_err(|e| anyhow::anyhow!("invalid fast SMA period: {:?}", e))?;
    let mut slow = SimpleMovingAverage::new(params.slow_period)
        .map_err(|e| anyhow::anyhow!("invalid slow SMA period: {:?}", e))?;
    let warmup = params.fast_period.max(params.slow_period).saturating_sub(1);

    let mut series = SignalSeries {
        entries: Vec::with_capacity(closes.len()),
        exits: Vec::with_capacity(closes.len()),
    };

    for (i, &close) in closes.iter().enumerate() {
        let f = fast.next(close);
        let s = slow.next(close);
        let ready = i >= warmup;
        series.entries.push(ready && f > s);
        series.exits.push(ready && f < s);
    }

    Ok(series)
}

/// RSI threshold signals
pub fn mean_reversion_signals(closes: &[f64], params: &StrategyParams) -> Result<SignalSeries> {
    let mut rsi = RelativeStrengthIndex::new(params.rsi_period)
        .map_err(|e| anyhow::anyhow!("invalid RSI period: {:?}", e))?;

    let mut series = SignalSeries {
        entries: Vec::with_capacity(closes.len()),
        exits: Vec::with_capacity(closes.len()),
    };

    for (i, &close) in closes.iter().enumerate() {
        let value = rsi.next(close);
        // The first `rsi_period` bars only seed the averages
        let ready = i >= params.rsi_period;
        series.entries.push(ready && value < params.rsi_entry);
        series.exits.push(ready && value > params.rsi_exit);
    }

    Ok(series)
}
