//! Market data provider abstraction
//!
//! The scanner only sees `MarketDataProvider`; Yahoo Finance is the default
//! source and Kite Connect can be swapped in through configuration.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::api::{KiteClient, YahooClient};
use crate::config::{ProviderKind, ScannerConfig};
use crate::error::{DataError, DataResult};
use crate::types::{Kline, WindowSpec};

/// Source of OHLCV bars. `Ok(vec![])` is the explicit "no data" answer.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, symbol: &str, window: &WindowSpec) -> DataResult<Vec<Kline>>;
}

#[async_trait]
impl MarketDataProvider for YahooClient {
    fn name(&self) -> &str {
        "yahoo"
    }

    async fn fetch(&self, symbol: &str, window: &WindowSpec) -> DataResult<Vec<Kline>> {
        self.get_chart(symbol, window).await
    }
}

#[async_trait]
impl MarketDataProvider for KiteClient {
    fn name(&self) -> &str {
        "kite"
    }

    async fn fetch(&self, symbol: &str, window: &WindowSpec) -> DataResult<Vec<Kline>> {
        self.get_history(symbol, window).await
    }
}

/// Stand-in for a provider that was selected but cannot run
pub struct UnavailableProvider {
    reason: String,
}

impl UnavailableProvider {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl MarketDataProvider for UnavailableProvider {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn fetch(&self, _symbol: &str, _window: &WindowSpec) -> DataResult<Vec<Kline>> {
        Err(DataError::NotConfigured(self.reason.clone()))
    }
}

/// Build the provider selected by the configuration
pub fn build_provider(config: &ScannerConfig) -> Arc<dyn MarketDataProvider> {
    match config.provider {
        ProviderKind::Yahoo => {
            info!("Using Yahoo Finance market data");
            Arc::new(YahooClient::new())
        }
        ProviderKind::Kite => match &config.kite {
            Some(credentials) => {
                info!("Using Zerodha Kite market data");
                Arc::new(KiteClient::new(credentials.clone()))
            }
            None => {
                error!("USE_ZERODHA=true but KITE_API_KEY and KITE_ACCESS_TOKEN are not set");
                Arc::new(UnavailableProvider::new(
                    "KITE_API_KEY and KITE_ACCESS_TOKEN env vars required",
                ))
            }
        },
    }
}
