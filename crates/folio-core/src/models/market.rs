use serde::{Deserialize, Serialize};

/// Latest quote from `GET /stocks/{symbol}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct StockQuote {
    pub symbol: String,
    pub current: f64,
    pub change: f64,
    /// Percent change, already scaled (1.5 means 1.5%).
    pub percent: f64,
}

/// Autocomplete hit from `GET /search`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SearchSuggestion {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl SearchSuggestion {
    pub fn label(&self) -> String {
        match (&self.symbol, &self.name) {
            (Some(symbol), Some(name)) => format!("{} - {}", symbol, name),
            (Some(symbol), None) => symbol.clone(),
            (None, Some(name)) => name.clone(),
            (None, None) => String::new(),
        }
    }
}
