use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::traits::BrokerApi;
use crate::errors::CoreError;
use crate::models::account::{Account, Environment};
use crate::models::cash::{AccountCash, AccountInfo};
use crate::models::endpoint::Endpoint;
use crate::models::order::{Order, OrderHistoryPage};
use crate::models::position::Position;

/// Upper bound Trading212 accepts for `limit` on paginated endpoints.
pub const MAX_PAGE_LIMIT: u32 = 50;

/// Longest slice of an error body kept in `CoreError::Api`.
const ERROR_BODY_LIMIT: usize = 200;

/// Trading212 public REST API client for one account.
///
/// - **Auth**: the API key goes verbatim into the `Authorization` header.
/// - **Environments**: live and demo share paths, differ in host.
/// - **Endpoints**: `/equity/account/cash`, `/equity/account/info`,
///   `/equity/portfolio`, `/equity/orders`, `/equity/history/orders`
///
/// Upstream rate limits are strict and per-account; this client does not
/// enforce them itself.
pub struct Trading212Client {
    client: Client,
    base_url: String,
    api_key: String,
    label: String,
}

impl Trading212Client {
    pub fn new(account: &Account, timeout: Duration) -> Self {
        Self::with_base_url(
            account.environment.base_url(),
            &account.api_key,
            &account.name,
            timeout,
        )
    }

    /// Point the client at an arbitrary base URL (proxies, local test servers).
    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        label: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            label: label.into(),
        }
    }

    pub fn for_environment(environment: Environment, api_key: impl Into<String>) -> Self {
        Self::with_base_url(
            environment.base_url(),
            api_key,
            environment.to_string(),
            Duration::from_secs(30),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL of an endpoint, without query parameters.
    pub fn url_for(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }

    /// GET an endpoint. Query parameters are percent-encoded by reqwest.
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        params: &[(&str, String)],
    ) -> Result<T, CoreError> {
        let url = self.url_for(endpoint);
        tracing::debug!(account = %self.label, %endpoint, "upstream request");

        let resp = self
            .client
            .get(&url)
            .query(params)
            .header(reqwest::header::AUTHORIZATION, &self.api_key)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(self.status_error(endpoint, status, &body));
        }

        resp.json().await.map_err(|e| CoreError::Api {
            provider: "Trading212".into(),
            status: status.as_u16(),
            message: format!("Failed to parse {endpoint} response: {e}"),
        })
    }

    fn status_error(&self, endpoint: Endpoint, status: StatusCode, body: &str) -> CoreError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                CoreError::Unauthorized(self.label.clone())
            }
            StatusCode::TOO_MANY_REQUESTS => CoreError::RateLimited {
                account: self.label.clone(),
                endpoint: endpoint.to_string(),
                retry_after_ms: 0,
            },
            _ => {
                let excerpt: String = body.chars().take(ERROR_BODY_LIMIT).collect();
                CoreError::Api {
                    provider: "Trading212".into(),
                    status: status.as_u16(),
                    message: format!("{endpoint} request failed: {excerpt}"),
                }
            }
        }
    }
}

/// Extract the `cursor` value from a `next_page_path` such as
/// `/api/v0/equity/history/orders?limit=50&cursor=1700000000000`.
pub fn cursor_from_next_page(next_page_path: &str) -> Option<String> {
    let (_, query) = next_page_path.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "cursor")
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

#[async_trait]
impl BrokerApi for Trading212Client {
    fn name(&self) -> &str {
        &self.label
    }

    async fn fetch_cash(&self) -> Result<AccountCash, CoreError> {
        self.get_json(Endpoint::Cash, &[]).await
    }

    async fn fetch_info(&self) -> Result<AccountInfo, CoreError> {
        self.get_json(Endpoint::Info, &[]).await
    }

    async fn fetch_positions(&self) -> Result<Vec<Position>, CoreError> {
        self.get_json(Endpoint::Portfolio, &[]).await
    }

    async fn fetch_orders(&self) -> Result<Vec<Order>, CoreError> {
        self.get_json(Endpoint::Orders, &[]).await
    }

    async fn fetch_order_history(
        &self,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<OrderHistoryPage, CoreError> {
        let mut params = vec![("limit", limit.clamp(1, MAX_PAGE_LIMIT).to_string())];
        if let Some(c) = cursor {
            params.push(("cursor", c.to_string()));
        }
        self.get_json(Endpoint::OrderHistory, &params).await
    }
}
