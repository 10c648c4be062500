//! Stub collaborators for unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::{DataError, DataResult};
use crate::provider::MarketDataProvider;
use crate::signal_engine::SignalEngine;
use crate::types::{Evaluation, Kline, WindowSpec};

/// Number of bars a stub series carries (enough to warm up every indicator)
pub const STUB_BARS: usize = 60;

#[derive(Debug, Clone)]
pub enum StubBehavior {
    /// Constant close at this price
    Flat(Decimal),
    Empty,
    Fail,
    Panic,
}

/// Provider answering from a fixed table; unknown symbols return no data
#[derive(Default)]
pub struct StubProvider {
    behaviors: HashMap<String, StubBehavior>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl StubProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, symbol: &str, behavior: StubBehavior) -> Self {
        self.behaviors.insert(symbol.to_string(), behavior);
        self
    }

    /// Every fetch sleeps for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Highest number of fetches observed running at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn fetch(&self, symbol: &str, _window: &WindowSpec) -> DataResult<Vec<Kline>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match self.behaviors.get(symbol) {
            Some(StubBehavior::Flat(price)) => Ok(flat_klines(*price, STUB_BARS)),
            Some(StubBehavior::Fail) => Err(DataError::Api(format!("stub failure for {}", symbol))),
            Some(StubBehavior::Panic) => panic!("stub panic for {}", symbol),
            Some(StubBehavior::Empty) | None => Ok(Vec::new()),
        }
    }
}

/// Signal engine that always fails
pub struct FailingEngine;

impl SignalEngine for FailingEngine {
    fn evaluate(&self, _klines: &[Kline], _window: &WindowSpec) -> anyhow::Result<Evaluation> {
        anyhow::bail!("indicator math failed")
    }
}

pub fn flat_klines(price: Decimal, bars: usize) -> Vec<Kline> {
    (0..bars)
        .map(|i| Kline {
            open_time: (i as i64) * 86_400_000,
            open: price,
            high: price + dec!(1),
            low: price - dec!(1),
            close: price,
            volume: dec!(1000),
            close_time: ((i + 1) as i64) * 86_400_000 - 1,
        })
        .collect()
}
