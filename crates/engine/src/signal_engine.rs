//! Signal engine: price series in, strategy metrics and current signals out

use anyhow::Result;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::backtest::{Portfolio, INITIAL_CASH};
use crate::strategies::{mean_reversion_signals, momentum_signals, SignalSeries, StrategyParams};
use crate::types::{
    finite_decimal, Evaluation, Kline, Recommendation, StrategyMetrics, StrategyReport, WindowSpec,
};

/// Pure evaluation of one price series. Must not block.
pub trait SignalEngine: Send + Sync {
    fn evaluate(&self, klines: &[Kline], window: &WindowSpec) -> Result<Evaluation>;
}

/// Momentum (SMA crossover) and mean reversion (RSI) backtested over the series
#[derive(Debug, Clone, Default)]
pub struct RuleBasedEngine {
    params: StrategyParams,
}

impl SignalEngine for RuleBasedEngine {
    fn evaluate(&self, klines: &[Kline], window: &WindowSpec) -> Result<Evaluation> {
        let last = klines
            .last()
            .ok_or_else(|| anyhow::anyhow!("empty price series"))?;

        let closes = klines
            .iter()
            .map(|k| {
                k.close
                    .to_f64()
                    .ok_or_else(|| anyhow::anyhow!("unrepresentable close {}", k.close))
            })
            .collect::<Result<Vec<f64>>>()?;

        let momentum = momentum_signals(&closes, &self.params)?;
        let mean_reversion = mean_reversion_signals(&closes, &self.params)?;

        let periods_per_year = window.periods_per_year();
        let momentum = report(&closes, &momentum, periods_per_year);
        let mean_reversion = report(&closes, &mean_reversion, periods_per_year);
        let recommendation = recommend(&momentum.metrics, &mean_reversion.metrics);

        Ok(Evaluation {
            last_price: Some(last.close),
            momentum,
            mean_reversion,
            recommendation,
        })
    }
}

fn report(closes: &[f64], signals: &SignalSeries, periods_per_year: Option<f64>) -> StrategyReport {
    let pf = Portfolio::from_signals(closes, signals, INITIAL_CASH);
    let sharpe = periods_per_year
        .map(|p| pf.sharpe_ratio(p))
        .unwrap_or(f64::NAN);

    StrategyReport {
        metrics: StrategyMetrics {
            return_pct: finite_decimal(pf.total_return() * 100.0),
            sharpe: finite_decimal(sharpe),
            max_dd_pct: finite_decimal(pf.max_drawdown() * 100.0),
            win_rate_pct: finite_decimal(pf.win_rate() * 100.0),
        },
        signal: signals.current_signal(),
    }
}

/// Short term: mean-reversion win rate above 50%. Long term: momentum Sharpe above 1.
pub fn recommend(momentum: &StrategyMetrics, mean_reversion: &StrategyMetrics) -> Recommendation {
    let short_term = mean_reversion.win_rate_pct.unwrap_or(Decimal::ZERO) > dec!(50);
    let long_term = momentum.sharpe.unwrap_or(Decimal::ZERO) > Decimal::ONE;

    match (short_term, long_term) {
        (true, true) => Recommendation::StrongBuy,
        (true, false) => Recommendation::ShortTermBuy,
        (false, true) => Recommendation::LongTermBuy,
        (false, false) => Recommendation::Avoid,
    }
}
