use serde::{Deserialize, Serialize};

/// Upstream resources the gateway reads.
///
/// Each endpoint is cached and rate limited independently per account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    /// `GET /equity/account/cash`
    Cash,
    /// `GET /equity/account/info`
    Info,
    /// `GET /equity/portfolio`
    Portfolio,
    /// `GET /equity/orders`
    Orders,
    /// `GET /equity/history/orders`
    OrderHistory,
}

impl Endpoint {
    pub const ALL: [Endpoint; 5] = [
        Endpoint::Cash,
        Endpoint::Info,
        Endpoint::Portfolio,
        Endpoint::Orders,
        Endpoint::OrderHistory,
    ];

    /// Path relative to the environment base URL.
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Cash => "/equity/account/cash",
            Endpoint::Info => "/equity/account/info",
            Endpoint::Portfolio => "/equity/portfolio",
            Endpoint::Orders => "/equity/orders",
            Endpoint::OrderHistory => "/equity/history/orders",
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Cash => write!(f, "cash"),
            Endpoint::Info => write!(f, "info"),
            Endpoint::Portfolio => write!(f, "portfolio"),
            Endpoint::Orders => write!(f, "orders"),
            Endpoint::OrderHistory => write!(f, "order_history"),
        }
    }
}
