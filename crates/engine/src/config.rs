//! Scanner configuration, read from the environment (`.env` is loaded by the binary)

use tracing::warn;

/// Default number of symbols evaluated at once by a background scan
pub const DEFAULT_MAX_WORKERS: usize = 5;

/// Which market data provider backs the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Yahoo,
    Kite,
}

/// Kite Connect credentials
#[derive(Clone)]
pub struct KiteCredentials {
    pub api_key: String,
    pub access_token: String,
}

impl std::fmt::Debug for KiteCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KiteCredentials")
            .field("api_key", &self.api_key)
            .field("access_token", &"***")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub provider: ProviderKind,
    pub kite: Option<KiteCredentials>,
    pub max_workers: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Yahoo,
            kite: None,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

impl ScannerConfig {
    /// Read `USE_ZERODHA`, `KITE_API_KEY`, `KITE_ACCESS_TOKEN` and `NSE_QUANT_MAX_WORKERS`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let provider = match lookup("USE_ZERODHA").as_deref() {
            Some("true") => ProviderKind::Kite,
            _ => ProviderKind::Yahoo,
        };

        let kite = match (lookup("KITE_API_KEY"), lookup("KITE_ACCESS_TOKEN")) {
            (Some(api_key), Some(access_token)) if !api_key.is_empty() && !access_token.is_empty() => {
                Some(KiteCredentials {
                    api_key,
                    access_token,
                })
            }
            _ => None,
        };

        let max_workers = match lookup("NSE_QUANT_MAX_WORKERS") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    warn!(value = %raw, "Invalid NSE_QUANT_MAX_WORKERS, using default");
                    DEFAULT_MAX_WORKERS
                }
            },
            None => DEFAULT_MAX_WORKERS,
        };

        Self {
            provider,
            kite,
            max_workers,
        }
    }
}
