//! Per-symbol evaluation and the synchronous (fetch-all-then-return) scans
//!
//! `run_symbol_task` is the isolation boundary: whatever the provider or the
//! signal engine does (error, empty series, panic), the caller gets a
//! well-formed `SymbolResult`.

use std::panic::AssertUnwindSafe;

use futures_util::{FutureExt, StreamExt};
use tracing::{debug, error, info, warn};

use crate::provider::MarketDataProvider;
use crate::signal_engine::SignalEngine;
use crate::types::{Evaluation, SymbolAnalysis, SymbolResult, WindowSpec};

/// Upper bound on symbols evaluated at once
pub const MAX_CONCURRENCY: usize = 32;

/// Clamp a requested concurrency limit to `1..=MAX_CONCURRENCY`
pub fn clamp_concurrency(requested: usize) -> usize {
    requested.clamp(1, MAX_CONCURRENCY)
}

/// Evaluate one symbol. Never fails: missing data and any failure yield a
/// degraded (null-filled) result.
pub async fn run_symbol_task(
    provider: &dyn MarketDataProvider,
    engine: &dyn SignalEngine,
    symbol: &str,
    window: &WindowSpec,
) -> SymbolResult {
    match evaluate_guarded(provider, engine, symbol, window).await {
        Some(evaluation) => SymbolResult::from_evaluation(symbol, &evaluation),
        None => SymbolResult::degraded(symbol),
    }
}

/// Full analysis of one symbol, `None` when there is no usable data
pub async fn analyze_symbol(
    provider: &dyn MarketDataProvider,
    engine: &dyn SignalEngine,
    symbol: &str,
    window: &WindowSpec,
) -> Option<SymbolAnalysis> {
    evaluate_guarded(provider, engine, symbol, window)
        .await
        .map(|evaluation| SymbolAnalysis::new(symbol, evaluation))
}

async fn evaluate_guarded(
    provider: &dyn MarketDataProvider,
    engine: &dyn SignalEngine,
    symbol: &str,
    window: &WindowSpec,
) -> Option<Evaluation> {
    let outcome = AssertUnwindSafe(fetch_and_evaluate(provider, engine, symbol, window))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(Some(evaluation))) => Some(evaluation),
        Ok(Ok(None)) => {
            info!(symbol, provider = provider.name(), "No data for symbol");
            None
        }
        Ok(Err(e)) => {
            warn!(symbol, error = %e, "Symbol evaluation failed");
            None
        }
        Err(_) => {
            error!(symbol, "Symbol evaluation panicked");
            None
        }
    }
}

async fn fetch_and_evaluate(
    provider: &dyn MarketDataProvider,
    engine: &dyn SignalEngine,
    symbol: &str,
    window: &WindowSpec,
) -> anyhow::Result<Option<Evaluation>> {
    let klines = provider.fetch(symbol, window).await?;
    if klines.is_empty() {
        return Ok(None);
    }

    debug!(symbol, bars = klines.len(), "Evaluating symbol");
    let evaluation = engine.evaluate(&klines, window)?;
    Ok(Some(evaluation))
}

/// Scan `symbols` and return the records in input order. Symbols without
/// usable data are left out.
pub async fn scan_market(
    provider: &dyn MarketDataProvider,
    engine: &dyn SignalEngine,
    symbols: &[String],
    window: &WindowSpec,
    concurrency: usize,
) -> Vec<SymbolResult> {
    info!(symbols = symbols.len(), interval = %window.interval, "Starting one-shot scan");

    let results: Vec<SymbolResult> = futures_util::stream::iter(
        symbols
            .iter()
            .map(|symbol| run_symbol_task(provider, engine, symbol, window))
            .collect::<Vec<_>>(),
    )
        .buffered(clamp_concurrency(concurrency))
        .filter(|result| std::future::ready(!result.is_degraded()))
        .collect()
        .await;

    info!(
        requested = symbols.len(),
        returned = results.len(),
        "One-shot scan complete"
    );
    results
}

/// Analyze `symbols` and return the records in input order. Symbols without
/// usable data are left out.
pub async fn analyze_market(
    provider: &dyn MarketDataProvider,
    engine: &dyn SignalEngine,
    symbols: &[String],
    window: &WindowSpec,
    concurrency: usize,
) -> Vec<SymbolAnalysis> {
    info!(symbols = symbols.len(), interval = %window.interval, "Starting one-shot analysis");

    let results: Vec<SymbolAnalysis> = futures_util::stream::iter(
        symbols
            .iter()
            .map(|symbol| analyze_symbol(provider, engine, symbol, window))
            .collect::<Vec<_>>(),
    )
        .buffered(clamp_concurrency(concurrency))
        .filter_map(std::future::ready)
        .collect()
        .await;

    info!(
        requested = symbols.len(),
        returned = results.len(),
        "One-shot analysis complete"
    );
    results
}
