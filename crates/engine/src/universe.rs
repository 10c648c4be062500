//! Named symbol universes (index memberships)
//!
//! Symbols carry the `.NS` suffix Yahoo Finance uses for NSE listings.

use serde::ser::{Serialize, SerializeMap, Serializer};

const NSE_SYMBOLS: &[&str] = &[
    "ADANIENT.NS",
    "ADANIPORTS.NS",
    "AMBUJACEM.NS",
    "ASIANPAINT.NS",
    "AUROPHARMA.NS",
    "AXISBANK.NS",
    "BAJAJ-AUTO.NS",
    "BAJFINANCE.NS",
    "BAJAJFINSV.NS",
    "BHARTIARTL.NS",
    "BPCL.NS",
    "BRITANNIA.NS",
    "CIPLA.NS",
    "COALINDIA.NS",
    "DIVISLAB.NS",
    "DRREDDY.NS",
    "EICHERMOT.NS",
    "GRASIM.NS",
    "HCLTECH.NS",
    "HDFCBANK.NS",
    "HDFCLIFE.NS",
    "HEROMOTOCO.NS",
    "HINDALCO.NS",
    "HINDUNILVR.NS",
    "HINDPETRO.NS",
    "HINDZINC.NS",
    "ICICIBANK.NS",
    "INDUSINDBK.NS",
    "INFY.NS",
    "JSWSTEEL.NS",
    "KOTAKBANK.NS",
    "LT.NS",
    "M&M.NS",
    "MARUTI.NS",
    "NESTLEIND.NS",
    "NTPC.NS",
    "ONGC.NS",
    "POWERGRID.NS",
    "RELIANCE.NS",
    "SBIN.NS",
    "SUNPHARMA.NS",
    "TATACHEM.NS",
    "TATACONSUM.NS",
    "TATASTEEL.NS",
    "TECHM.NS",
    "TCS.NS",
    "ULTRACEMCO.NS",
    "WIPRO.NS",
];

const NIFTY_BANK: &[&str] = &[
    "HDFCBANK.NS",
    "ICICIBANK.NS",
    "AXISBANK.NS",
    "KOTAKBANK.NS",
    "SBIN.NS",
    "INDUSINDBK.NS",
];

const NIFTY_IT: &[&str] = &["TCS.NS", "INFY.NS", "WIPRO.NS", "HCLTECH.NS", "TECHM.NS"];

const NIFTY_AUTO: &[&str] = &[
    "MARUTI.NS",
    "BAJAJ-AUTO.NS",
    "M&M.NS",
    "EICHERMOT.NS",
    "HEROMOTOCO.NS",
];

const NIFTY_FMCG: &[&str] = &[
    "HINDUNILVR.NS",
    "BRITANNIA.NS",
    "NESTLEIND.NS",
    "TATACONSUM.NS",
];

/// A named list of symbols
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    pub name: String,
    pub symbols: Vec<String>,
}

/// Ordered catalog of indexes; the first entry is the default
#[derive(Debug, Clone, Default)]
pub struct IndexCatalog {
    indexes: Vec<IndexDefinition>,
}

impl IndexCatalog {
    pub fn new(indexes: Vec<IndexDefinition>) -> Self {
        Self { indexes }
    }

    /// Built-in NSE universes
    pub fn nse() -> Self {
        let entries: [(&str, &[&str]); 6] = [
            ("NSE 50", NSE_SYMBOLS),
            ("NIFTY 50", NSE_SYMBOLS),
            ("NIFTY BANK", NIFTY_BANK),
            ("NIFTY IT", NIFTY_IT),
            ("NIFTY AUTO", NIFTY_AUTO),
            ("NIFTY FMCG", NIFTY_FMCG),
        ];
        Self::new(
            entries
                .iter()
                .map(|(name, symbols)| IndexDefinition {
                    name: name.to_string(),
                    symbols: symbols.iter().map(|s| s.to_string()).collect(),
                })
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn get(&self, name: &str) -> Option<&IndexDefinition> {
        self.indexes.iter().find(|i| i.name == name)
    }

    pub fn default_index(&self) -> Option<&IndexDefinition> {
        self.indexes.first()
    }

    /// Look up `name`, or the default index when no name is given
    pub fn resolve(&self, name: Option<&str>) -> Option<&IndexDefinition> {
        match name {
            Some(name) => self.get(name),
            None => self.default_index(),
        }
    }
}

impl Serialize for IndexCatalog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.indexes.len()))?;
        for index in &self.indexes {
            map.serialize_entry(&index.name, &index.symbols)?;
        }
        map.end()
    }
}
