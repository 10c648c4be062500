use thiserror::Error;

/// Errors from market data providers
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("Provider API error: {0}")]
    Api(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type DataResult<T> = Result<T, DataError>;
