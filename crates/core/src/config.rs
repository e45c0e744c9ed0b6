use serde::Deserialize;
use std::time::Duration;

use crate::errors::CoreError;
use crate::logging::LoggingConfig;
use crate::models::endpoint::Endpoint;

/// A fixed window: at most `max_requests` per `window_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct WindowConfig {
    pub max_requests: u32,
    pub window_ms: u64,
}

impl WindowConfig {
    pub const fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Per-endpoint rate limits, applied separately to every account.
///
/// Defaults mirror the limits Trading212 publishes for each endpoint, so the
/// dashboard rejects locally instead of collecting upstream 429s.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub cash: WindowConfig,
    pub info: WindowConfig,
    pub portfolio: WindowConfig,
    pub orders: WindowConfig,
    pub order_history: WindowConfig,
}

impl RateLimitConfig {
    pub fn for_endpoint(&self, endpoint: Endpoint) -> WindowConfig {
        match endpoint {
            Endpoint::Cash => self.cash,
            Endpoint::Info => self.info,
            Endpoint::Portfolio => self.portfolio,
            Endpoint::Orders => self.orders,
            Endpoint::OrderHistory => self.order_history,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            cash: WindowConfig::new(1, 2_000),
            info: WindowConfig::new(1, 30_000),
            portfolio: WindowConfig::new(1, 5_000),
            orders: WindowConfig::new(1, 5_000),
            order_history: WindowConfig::new(6, 60_000),
        }
    }
}

/// Response cache lifetimes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub cash_ttl_ms: u64,
    pub info_ttl_ms: u64,
    pub portfolio_ttl_ms: u64,
    pub orders_ttl_ms: u64,
    pub order_history_ttl_ms: u64,
    /// Oldest a cached response may be and still be served as stale
    pub stale_grace_secs: u64,
}

impl CacheConfig {
    pub fn ttl_for(&self, endpoint: Endpoint) -> Duration {
        let ms = match endpoint {
            Endpoint::Cash => self.cash_ttl_ms,
            Endpoint::Info => self.info_ttl_ms,
            Endpoint::Portfolio => self.portfolio_ttl_ms,
            Endpoint::Orders => self.orders_ttl_ms,
            Endpoint::OrderHistory => self.order_history_ttl_ms,
        };
        Duration::from_millis(ms)
    }

    pub fn stale_grace(&self) -> Duration {
        Duration::from_secs(self.stale_grace_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cash_ttl_ms: 2_000,
            info_ttl_ms: 30_000,
            portfolio_ttl_ms: 5_000,
            orders_ttl_ms: 5_000,
            order_history_ttl_ms: 60_000,
            stale_grace_secs: 300,
        }
    }
}

/// Runtime configuration of the dashboard core.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Upstream HTTP timeout
    pub request_timeout_secs: u64,
    pub cache: CacheConfig,
    pub rate_limits: RateLimitConfig,
    pub logging: LoggingConfig,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            cache: CacheConfig::default(),
            rate_limits: RateLimitConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl DashboardConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Parse a JSON config document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let config: DashboardConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `T212_*` environment variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup("T212_REQUEST_TIMEOUT_SECS") {
            match raw.parse::<u64>() {
                Ok(value) if value > 0 => config.request_timeout_secs = value,
                _ => tracing::warn!(
                    "Invalid T212_REQUEST_TIMEOUT_SECS '{}', using default: {}",
                    raw,
                    config.request_timeout_secs
                ),
            }
        }

        if let Some(raw) = lookup("T212_STALE_GRACE_SECS") {
            match raw.parse::<u64>() {
                Ok(value) => config.cache.stale_grace_secs = value,
                Err(e) => tracing::warn!(
                    "Failed to parse T212_STALE_GRACE_SECS '{}': {}, using default: {}",
                    raw,
                    e,
                    config.cache.stale_grace_secs
                ),
            }
        }

        if let Some(level) = lookup("T212_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Some(format) = lookup("T212_LOG_FORMAT") {
            match format.as_str() {
                "json" | "pretty" => config.logging.format = format,
                other => tracing::warn!(
                    "Unknown T212_LOG_FORMAT '{}', using default: {}",
                    other,
                    config.logging.format
                ),
            }
        }

        config
    }

    /// Reject limits that would block an endpoint forever or never expire.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.request_timeout_secs == 0 {
            return Err(CoreError::ValidationError(
                "request_timeout_secs must be positive".into(),
            ));
        }
        for endpoint in Endpoint::ALL {
            let limit = self.rate_limits.for_endpoint(endpoint);
            if limit.max_requests == 0 || limit.window_ms == 0 {
                return Err(CoreError::ValidationError(format!(
                    "Rate limit for {endpoint} must allow at least one request per non-empty window"
                )));
            }
        }
        Ok(())
    }
}
