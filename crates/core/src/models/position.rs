use serde::{Deserialize, Serialize};

/// An open position as returned by `GET /equity/portfolio`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    /// Instrument ticker (e.g., "AAPL_US_EQ")
    pub ticker: String,
    pub quantity: f64,
    /// Average fill price in instrument currency
    pub average_price: f64,
    /// Last price in instrument currency
    pub current_price: f64,
    /// Unrealised P/L in account currency
    pub ppl: f64,
    /// FX component of the P/L, when the instrument is in another currency
    #[serde(default)]
    pub fx_ppl: Option<f64>,
    #[serde(default)]
    pub initial_fill_date: Option<String>,
    /// Where the position was opened ("API", "IOS", "WEB", ...)
    #[serde(default)]
    pub frontend: Option<String>,
}
