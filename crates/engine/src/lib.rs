//! NSE Quant Engine: background scans and signal evaluation for NSE equities
//!
//! Provides:
//! - Market data providers (Yahoo Finance, Zerodha Kite) behind one trait
//! - Momentum (SMA crossover) and RSI mean-reversion backtests
//! - Per-symbol task isolation and one-shot scans
//! - Scan Orchestrator and Scan Registry for background, pollable scans
//! - Named index universes

pub mod api;
pub mod backtest;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod provider;
pub mod registry;
pub mod scanner;
pub mod signal_engine;
pub mod strategies;
pub mod types;
pub mod universe;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use api::{KiteClient, YahooClient};
pub use config::{KiteCredentials, ProviderKind, ScannerConfig, DEFAULT_MAX_WORKERS};
pub use error::{DataError, DataResult};
pub use orchestrator::{ScanOrchestrator, StartOutcome};
pub use provider::{build_provider, MarketDataProvider, UnavailableProvider};
pub use registry::{RunTicket, ScanRegistry, ScanResults, ScanStatus};
pub use scanner::{analyze_market, run_symbol_task, scan_market, MAX_CONCURRENCY};
pub use signal_engine::{RuleBasedEngine, SignalEngine};
pub use strategies::StrategyParams;
pub use types::*;
pub use universe::{IndexCatalog, IndexDefinition};
