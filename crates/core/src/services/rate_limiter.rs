use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::{RateLimitConfig, WindowConfig};
use crate::models::endpoint::Endpoint;

/// Counter state for one (account, endpoint) pair.
#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Rejected { retry_after: Duration },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed)
    }
}

/// Fixed-window request counter, per account and per endpoint.
///
/// A window opens on the first request after the previous one expired and
/// admits up to `max_requests` until it closes. Accounts never share
/// counters: one busy account cannot starve another.
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<(Uuid, Endpoint), Window>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Try to spend one request for `endpoint` on `account` now.
    pub fn try_acquire(&self, account: Uuid, endpoint: Endpoint) -> RateLimitDecision {
        self.try_acquire_at(account, endpoint, Instant::now())
    }

    /// Same as [`try_acquire`](Self::try_acquire) at an explicit instant.
    pub fn try_acquire_at(
        &self,
        account: Uuid,
        endpoint: Endpoint,
        now: Instant,
    ) -> RateLimitDecision {
        let limit = self.config.for_endpoint(endpoint);
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let window = windows.entry((account, endpoint)).or_insert(Window {
            started: now,
            count: 0,
        });

        if Self::expired(window, &limit, now) {
            window.started = now;
            window.count = 0;
        }

        if window.count < limit.max_requests {
            window.count += 1;
            RateLimitDecision::Allowed
        } else {
            let ends = window.started + limit.window();
            RateLimitDecision::Rejected {
                retry_after: ends.saturating_duration_since(now),
            }
        }
    }

    /// Requests still available in the current window at `now`.
    pub fn remaining_at(&self, account: Uuid, endpoint: Endpoint, now: Instant) -> u32 {
        let limit = self.config.for_endpoint(endpoint);
        let windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        match windows.get(&(account, endpoint)) {
            Some(window) if !Self::expired(window, &limit, now) => {
                limit.max_requests.saturating_sub(window.count)
            }
            _ => limit.max_requests,
        }
    }

    pub fn remaining(&self, account: Uuid, endpoint: Endpoint) -> u32 {
        self.remaining_at(account, endpoint, Instant::now())
    }

    /// Forget every window of an account (e.g., after the account is removed).
    pub fn reset(&self, account: Uuid) {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        windows.retain(|(id, _), _| *id != account);
    }

    fn expired(window: &Window, limit: &WindowConfig, now: Instant) -> bool {
        now.saturating_duration_since(window.started) >= limit.window()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
