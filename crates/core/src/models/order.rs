use serde::{Deserialize, Serialize};

/// A pending order as returned by `GET /equity/orders`.
///
/// Order type and status are kept as the upstream strings; the dashboard
/// only displays them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    #[serde(rename = "type")]
    pub order_type: String,
    pub ticker: String,
    /// Negative for sell orders
    pub quantity: f64,
    #[serde(default)]
    pub filled_quantity: Option<f64>,
    #[serde(default)]
    pub limit_price: Option<f64>,
    #[serde(default)]
    pub stop_price: Option<f64>,
    pub status: String,
    #[serde(default)]
    pub creation_time: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
}

impl Order {
    pub fn is_sell(&self) -> bool {
        self.quantity < 0.0
    }
}

/// A historical (filled, cancelled or rejected) order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalOrder {
    pub id: i64,
    pub ticker: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub status: String,
    /// Negative for sells
    #[serde(default)]
    pub ordered_quantity: Option<f64>,
    #[serde(default)]
    pub filled_quantity: Option<f64>,
    #[serde(default)]
    pub fill_price: Option<f64>,
    #[serde(default)]
    pub filled_value: Option<f64>,
    #[serde(default)]
    pub date_created: Option<String>,
    /// RFC 3339 timestamp of the fill
    #[serde(default)]
    pub date_executed: Option<String>,
}

impl HistoricalOrder {
    /// Sells are recognised by a negative ordered or filled quantity.
    pub fn is_sell(&self) -> bool {
        self.ordered_quantity
            .or(self.filled_quantity)
            .is_some_and(|q| q < 0.0)
    }
}

/// One page of `GET /equity/history/orders`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderHistoryPage {
    pub items: Vec<HistoricalOrder>,
    /// Relative path of the next page, `None` on the last page
    #[serde(default)]
    pub next_page_path: Option<String>,
}
