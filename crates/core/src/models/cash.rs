use serde::{Deserialize, Serialize};

/// Cash breakdown as returned by `GET /equity/account/cash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountCash {
    /// Cash available to trade
    pub free: f64,
    /// Total account value (cash + invested + unrealised P/L)
    pub total: f64,
    /// Unrealised profit/loss of open positions
    pub ppl: f64,
    /// Realised profit/loss
    pub result: f64,
    /// Cost basis of open positions
    pub invested: f64,
    #[serde(default)]
    pub pie_cash: f64,
    /// Cash reserved by pending orders
    #[serde(default)]
    pub blocked: Option<f64>,
}

/// Account metadata as returned by `GET /equity/account/info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub id: i64,
    pub currency_code: String,
}
