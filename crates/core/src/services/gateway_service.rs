use futures_util::future::{join_all, BoxFuture, Shared};
use futures_util::FutureExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{CacheConfig, DashboardConfig};
use crate::errors::CoreError;
use crate::models::cash::{AccountCash, AccountInfo};
use crate::models::endpoint::Endpoint;
use crate::models::order::{Order, OrderHistoryPage};
use crate::models::position::Position;
use crate::models::summary::{Freshness, Section};
use crate::providers::registry::ClientRegistry;
use crate::providers::trading212::MAX_PAGE_LIMIT;
use crate::providers::traits::BrokerApi;
use crate::services::rate_limiter::{RateLimitDecision, RateLimiter};
use crate::services::response_cache::{CacheKey, ResponseCache};

/// Any upstream response the gateway caches.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Cash(AccountCash),
    Info(AccountInfo),
    Positions(Vec<Position>),
    Orders(Vec<Order>),
    OrderHistory(OrderHistoryPage),
}

/// A response together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub data: T,
    pub freshness: Freshness,
}

impl<T> Fetched<T> {
    pub fn into_section(self) -> Section<T> {
        Section::Ready {
            data: self.data,
            freshness: self.freshness,
        }
    }
}

/// The three independently-loaded parts of an account dashboard.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSnapshot {
    pub cash: Section<AccountCash>,
    pub positions: Section<Vec<Position>>,
    pub orders: Section<Vec<Order>>,
}

impl AccountSnapshot {
    /// Snapshot where every section failed with the same error.
    pub fn failed(error: &CoreError) -> Self {
        let message = error.to_string();
        Self {
            cash: Section::Failed {
                error: message.clone(),
            },
            positions: Section::Failed {
                error: message.clone(),
            },
            orders: Section::Failed { error: message },
        }
    }
}

type SharedFetch = Shared<BoxFuture<'static, Result<Payload, CoreError>>>;

/// Removes the in-flight entry when the leading request finishes or is dropped.
struct InflightGuard<'a> {
    inflight: &'a Mutex<HashMap<CacheKey, SharedFetch>>,
    key: CacheKey,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        inflight.remove(&self.key);
    }
}

/// The aggregation layer between the dashboard and the upstream API.
///
/// For every (account, endpoint) request:
/// 1. A response younger than the endpoint TTL is served from cache.
/// 2. Concurrent identical requests share one upstream call.
/// 3. The per-account fixed-window limiter must admit the call, otherwise
///    the last response is served as stale (or `RateLimited` if none).
/// 4. Upstream failures fall back to a stale response when one exists
///    within the grace period.
///
/// Multi-section and multi-account loads never fail as a whole: each part
/// succeeds or fails on its own.
pub struct GatewayService {
    registry: ClientRegistry,
    limiter: RateLimiter,
    cache: Arc<ResponseCache<Payload>>,
    cache_config: CacheConfig,
    inflight: Mutex<HashMap<CacheKey, SharedFetch>>,
    history_page_limit: u32,
}

impl GatewayService {
    pub fn new(registry: ClientRegistry, config: &DashboardConfig) -> Self {
        Self {
            registry,
            limiter: RateLimiter::new(config.rate_limits.clone()),
            cache: Arc::new(ResponseCache::new()),
            cache_config: config.cache.clone(),
            inflight: Mutex::new(HashMap::new()),
            history_page_limit: MAX_PAGE_LIMIT,
        }
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Register (or replace) the upstream client of an account.
    /// Cached responses from a previous client are dropped.
    pub fn register_client(&mut self, account: Uuid, client: Arc<dyn BrokerApi>) {
        self.registry.register(account, client);
        self.cache.invalidate(account);
    }

    /// Replace an account's client with one talking to the same upstream
    /// account. Cached responses stay valid.
    pub fn swap_client(&mut self, account: Uuid, client: Arc<dyn BrokerApi>) {
        self.registry.register(account, client);
    }

    /// Forget an account entirely: client, cache entries and rate windows.
    pub fn remove_client(&mut self, account: Uuid) -> bool {
        self.cache.invalidate(account);
        self.limiter.reset(account);
        self.registry.remove(account)
    }

    pub fn cache(&self) -> &ResponseCache<Payload> {
        &self.cache
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Load one endpoint of one account through cache, single-flight and
    /// rate limiter.
    pub async fn load(&self, account: Uuid, endpoint: Endpoint) -> Result<Fetched<Payload>, CoreError> {
        let key = (account, endpoint);
        let ttl = self.cache_config.ttl_for(endpoint);

        if let Some(data) = self.cache.get_fresh(key, ttl) {
            debug!(%account, %endpoint, "cache hit");
            return Ok(Fetched {
                data,
                freshness: Freshness::Cached,
            });
        }

        let client = self
            .registry
            .get(account)
            .ok_or_else(|| CoreError::AccountNotFound(account.to_string()))?;

        let (fetch, leader) = {
            let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(existing) = inflight.get(&key) {
                debug!(%account, %endpoint, "joining in-flight request");
                (existing.clone(), false)
            } else {
                // A leader may have filled the cache since the first check
                if let Some(data) = self.cache.get_fresh(key, ttl) {
                    return Ok(Fetched {
                        data,
                        freshness: Freshness::Cached,
                    });
                }

                if let RateLimitDecision::Rejected { retry_after } =
                    self.limiter.try_acquire(account, endpoint)
                {
                    warn!(%account, %endpoint, ?retry_after, "local rate limit reached");
                    let err = CoreError::RateLimited {
                        account: account.to_string(),
                        endpoint: endpoint.to_string(),
                        retry_after_ms: retry_after.as_millis() as u64,
                    };
                    return self.fallback(key, err);
                }

                // The shared future stores its own result, so a response still
                // lands in the cache when the caller that started it goes away.
                let cache = Arc::clone(&self.cache);
                let fetch = Self::fetch_payload(client, endpoint, self.history_page_limit)
                    .map(move |result| {
                        if let Ok(data) = &result {
                            cache.insert(key, data.clone());
                        }
                        result
                    })
                    .boxed()
                    .shared();
                inflight.insert(key, fetch.clone());
                (fetch, true)
            }
        };

        let _guard = leader.then(|| InflightGuard {
            inflight: &self.inflight,
            key,
        });

        match fetch.await {
            Ok(data) => Ok(Fetched {
                data,
                freshness: Freshness::Fresh,
            }),
            Err(err) => {
                warn!(%account, %endpoint, error = %err, "upstream request failed");
                self.fallback(key, err)
            }
        }
    }

    pub async fn cash(&self, account: Uuid) -> Result<Fetched<AccountCash>, CoreError> {
        let fetched = self.load(account, Endpoint::Cash).await?;
        extract(fetched, Endpoint::Cash, |p| match p {
            Payload::Cash(cash) => Some(cash),
            _ => None,
        })
    }

    pub async fn info(&self, account: Uuid) -> Result<Fetched<AccountInfo>, CoreError> {
        let fetched = self.load(account, Endpoint::Info).await?;
        extract(fetched, Endpoint::Info, |p| match p {
            Payload::Info(info) => Some(info),
            _ => None,
        })
    }

    pub async fn positions(&self, account: Uuid) -> Result<Fetched<Vec<Position>>, CoreError> {
        let fetched = self.load(account, Endpoint::Portfolio).await?;
        extract(fetched, Endpoint::Portfolio, |p| match p {
            Payload::Positions(positions) => Some(positions),
            _ => None,
        })
    }

    pub async fn orders(&self, account: Uuid) -> Result<Fetched<Vec<Order>>, CoreError> {
        let fetched = self.load(account, Endpoint::Orders).await?;
        extract(fetched, Endpoint::Orders, |p| match p {
            Payload::Orders(orders) => Some(orders),
            _ => None,
        })
    }

    /// First page of order history (cached), or a later page (rate limited,
    /// never cached).
    pub async fn order_history(
        &self,
        account: Uuid,
        cursor: Option<&str>,
    ) -> Result<Fetched<OrderHistoryPage>, CoreError> {
        let Some(cursor) = cursor else {
            let fetched = self.load(account, Endpoint::OrderHistory).await?;
            return extract(fetched, Endpoint::OrderHistory, |p| match p {
                Payload::OrderHistory(page) => Some(page),
                _ => None,
            });
        };

        let client = self
            .registry
            .get(account)
            .ok_or_else(|| CoreError::AccountNotFound(account.to_string()))?;

        if let RateLimitDecision::Rejected { retry_after } =
            self.limiter.try_acquire(account, Endpoint::OrderHistory)
        {
            return Err(CoreError::RateLimited {
                account: account.to_string(),
                endpoint: Endpoint::OrderHistory.to_string(),
                retry_after_ms: retry_after.as_millis() as u64,
            });
        }

        let page = client
            .fetch_order_history(Some(cursor), self.history_page_limit)
            .await?;
        Ok(Fetched {
            data: page,
            freshness: Freshness::Fresh,
        })
    }

    /// Cash, positions and orders of one account, loaded concurrently.
    /// Each section succeeds or fails on its own.
    pub async fn account_snapshot(&self, account: Uuid) -> AccountSnapshot {
        let (cash, positions, orders) = tokio::join!(
            self.cash(account),
            self.positions(account),
            self.orders(account)
        );

        let snapshot = AccountSnapshot {
            cash: to_section(cash),
            positions: to_section(positions),
            orders: to_section(orders),
        };

        let failed = [
            snapshot.cash.is_ready(),
            snapshot.positions.is_ready(),
            snapshot.orders.is_ready(),
        ]
        .iter()
        .filter(|ready| !**ready)
        .count();
        if failed > 0 {
            warn!(%account, failed, "account snapshot partially unavailable");
        }

        snapshot
    }

    /// Snapshots of many accounts, loaded concurrently, in input order.
    pub async fn snapshots(&self, accounts: &[Uuid]) -> Vec<(Uuid, AccountSnapshot)> {
        let loads = accounts.iter().map(|&id| async move {
            let snapshot = if self.registry.contains(id) {
                self.account_snapshot(id).await
            } else {
                AccountSnapshot::failed(&CoreError::AccountNotFound(id.to_string()))
            };
            (id, snapshot)
        });
        join_all(loads).await
    }

    /// Expire an account's cached responses so the next load goes upstream.
    ///
    /// The entries stay available as stale fallback; rate limits still apply.
    pub fn refresh(&self, account: Uuid) -> usize {
        self.cache.mark_expired(account)
    }

    /// Drop cached responses older than the stale grace period.
    pub fn prune_cache(&self) -> usize {
        self.cache.prune(self.cache_config.stale_grace())
    }

    fn fallback(&self, key: CacheKey, err: CoreError) -> Result<Fetched<Payload>, CoreError> {
        if err.allows_stale_fallback() {
            if let Some(data) = self.cache.get_stale(key, self.cache_config.stale_grace()) {
                warn!(account = %key.0, endpoint = %key.1, error = %err, "serving stale response");
                return Ok(Fetched {
                    data,
                    freshness: Freshness::Stale,
                });
            }
        }
        Err(err)
    }

    async fn fetch_payload(
        client: Arc<dyn BrokerApi>,
        endpoint: Endpoint,
        history_page_limit: u32,
    ) -> Result<Payload, CoreError> {
        match endpoint {
            Endpoint::Cash => client.fetch_cash().await.map(Payload::Cash),
            Endpoint::Info => client.fetch_info().await.map(Payload::Info),
            Endpoint::Portfolio => client.fetch_positions().await.map(Payload::Positions),
            Endpoint::Orders => client.fetch_orders().await.map(Payload::Orders),
            Endpoint::OrderHistory => client
                .fetch_order_history(None, history_page_limit)
                .await
                .map(Payload::OrderHistory),
        }
    }
}

fn extract<T>(
    fetched: Fetched<Payload>,
    endpoint: Endpoint,
    pick: impl FnOnce(Payload) -> Option<T>,
) -> Result<Fetched<T>, CoreError> {
    let freshness = fetched.freshness;
    pick(fetched.data)
        .map(|data| Fetched { data, freshness })
        .ok_or_else(|| CoreError::Api {
            provider: "gateway".into(),
            status: 0,
            message: format!("cached payload does not match endpoint {endpoint}"),
        })
}

fn to_section<T>(result: Result<Fetched<T>, CoreError>) -> Section<T> {
    match result {
        Ok(fetched) => fetched.into_section(),
        Err(err) => Section::Failed {
            error: err.to_string(),
        },
    }
}
