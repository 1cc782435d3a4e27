use serde::{Deserialize, Serialize};

/// One position as reported in the portfolio summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub symbol: String,
    pub quantity: f64,
    pub average_price: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    #[serde(default)]
    pub holdings: Vec<Holding>,
    #[serde(default)]
    pub total_market_value: Option<f64>,
}

impl Portfolio {
    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }

    /// Distinct symbols, in holding order.
    pub fn symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = Vec::with_capacity(self.holdings.len());
        for holding in &self.holdings {
            if !symbols.contains(&holding.symbol.as_str()) {
                symbols.push(&holding.symbol);
            }
        }
        symbols
    }
}

/// Stored row returned after adding or updating a holding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct PortfolioItem {
    #[serde(default)]
    pub id: Option<String>,
    pub symbol: String,
    pub quantity: f64,
    pub average_price: f64,
}

/// Body of `POST /portfolio/{user}/holdings`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AddHoldingRequest<'a> {
    pub symbol: &'a str,
    pub quantity: f64,
    pub buy_price: f64,
}
