use async_trait::async_trait;

use crate::errors::CoreError;
use crate::models::cash::{AccountCash, AccountInfo};
use crate::models::order::{Order, OrderHistoryPage};
use crate::models::position::Position;

/// Read-only view of one brokerage account's REST API.
///
/// `Trading212Client` is the real implementation; tests plug in mocks.
/// Every method is one upstream request, with no caching and no rate limiting;
/// those belong to `GatewayService`.
#[async_trait]
pub trait BrokerApi: Send + Sync {
    /// Human-readable name of this client (for logs/errors).
    fn name(&self) -> &str;

    /// Cash balances and realised/unrealised P/L.
    async fn fetch_cash(&self) -> Result<AccountCash, CoreError>;

    /// Account id and currency.
    async fn fetch_info(&self) -> Result<AccountInfo, CoreError>;

    /// All open positions.
    async fn fetch_positions(&self) -> Result<Vec<Position>, CoreError>;

    /// All pending orders.
    async fn fetch_orders(&self) -> Result<Vec<Order>, CoreError>;

    /// One page of historical orders, newest first.
    /// `cursor` is the opaque value from the previous page's `next_page_path`.
    async fn fetch_order_history(
        &self,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<OrderHistoryPage, CoreError>;
}
